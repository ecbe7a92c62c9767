// Build identity, shown by `--version` and tagged onto our own connections

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Connection name (`fleetwatch-0.3.0`) so the monitor's own session is easy
/// to spot in a captured client listing. Only `[A-Za-z0-9._-]` is emitted.
pub fn client_name() -> String {
    format!("{}-{}", NAME, VERSION)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_name_has_no_spaces() {
        let name = client_name();
        assert!(name.starts_with(NAME));
        assert!(!name.contains(' '));
    }
}
