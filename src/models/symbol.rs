//! Dashboard-to-broker symbol mapping.

/// Dashboard symbols whose broker name differs.
const BROKER_ALIASES: &[(&str, &str)] = &[("WTI", "USOIL")];

/// Normalizes a broker symbol that may carry a suffix
/// (`"xauusd.a"` → `"XAUUSD"`, `"US100-cash"` → `"US100"`).
pub fn canonical_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_ascii_uppercase();
    match upper.find(['.', '-', '_']) {
        Some(idx) => upper[..idx].to_string(),
        None => upper,
    }
}

/// Returns the broker symbol for a dashboard symbol.
pub fn broker_symbol(symbol: &str) -> String {
    let canonical = canonical_symbol(symbol);
    BROKER_ALIASES
        .iter()
        .find(|(dashboard, _)| *dashboard == canonical)
        .map(|(_, broker)| (*broker).to_string())
        .unwrap_or(canonical)
}
