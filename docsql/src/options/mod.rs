/// Options passed in for translation, consulted by every compiler component.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    pub case_sensitivity: CaseSensitivity,
}

impl TranslateOptions {
    pub fn new(case_sensitivity: CaseSensitivity) -> Self {
        TranslateOptions { case_sensitivity }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitivity == CaseSensitivity::Sensitive
    }
}

/// Specifies whether pattern matching (LIKE, Contains, StartsWith, EndsWith)
/// distinguishes letter case.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    #[default]
    Insensitive,
}

impl From<bool> for CaseSensitivity {
    fn from(case_sensitive: bool) -> Self {
        if case_sensitive {
            CaseSensitivity::Sensitive
        } else {
            CaseSensitivity::Insensitive
        }
    }
}
