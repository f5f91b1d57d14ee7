/// Layout and import settings shared by every component of a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Packages whose types never need an import.
    pub implicit_import_packages: Vec<String>,
    pub line_separator: String,
    /// Indentation added per nesting level when inserting into an empty body.
    pub indent_unit: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            implicit_import_packages: vec!["java.lang".to_string()],
            line_separator: "\n".to_string(),
            indent_unit: "    ".to_string(),
        }
    }
}

impl SessionOptions {
    pub fn is_implicitly_imported(&self, qualified_name: &str) -> bool {
        match qualified_name.rsplit_once('.') {
            Some((package, _)) => self.implicit_import_packages.iter().any(|p| p == package),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_imports() {
        let options = SessionOptions::default();
        assert!(options.is_implicitly_imported("java.lang.String"));
        assert!(!options.is_implicitly_imported("java.lang.reflect.Method"));
        assert!(!options.is_implicitly_imported("java.util.List"));
        assert!(options.is_implicitly_imported("DefaultPackageType"));
    }
}
