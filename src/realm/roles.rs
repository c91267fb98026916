//! Default role restriction applied to every authentication.

use std::fmt;

/// Roles every authentication is scoped to.
///
/// Empty means no restriction: the engine activates the subject's full assigned set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultRoleRestriction {
    roles: Vec<String>,
}

impl DefaultRoleRestriction {
    /// Parse a comma-delimited list; whitespace around names is dropped, as are
    /// empty names and repeats
    pub fn parse(csv: Option<&str>) -> Self {
        let mut roles: Vec<String> = Vec::new();
        for name in csv.unwrap_or_default().split(',').map(str::trim) {
            if !name.is_empty() && !roles.iter().any(|r| r == name) {
                roles.push(name.to_string());
            }
        }
        Self { roles }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl fmt::Display for DefaultRoleRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.roles.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_around_commas() {
        let restriction = DefaultRoleRestriction::parse(Some(" teller , auditor "));
        assert_eq!(restriction.roles(), ["teller", "auditor"]);
        assert_eq!(restriction.to_string(), "teller,auditor");
    }

    #[test]
    fn test_parse_drops_empty_and_repeated_names() {
        let restriction = DefaultRoleRestriction::parse(Some("teller,, teller ,manager,"));
        assert_eq!(restriction.roles(), ["teller", "manager"]);
    }

    #[test]
    fn test_empty_input_clears() {
        assert!(DefaultRoleRestriction::parse(None).is_empty());
        assert!(DefaultRoleRestriction::parse(Some("  ")).is_empty());
        assert!(DefaultRoleRestriction::parse(Some(" , ")).is_empty());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let restriction = DefaultRoleRestriction::parse(Some("Teller"));
        assert!(restriction.contains("Teller"));
        assert!(!restriction.contains("teller"));
    }
}
