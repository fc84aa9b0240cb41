use serde::{Deserialize, Serialize};

/// Tunables for the built-in validators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Cap for text attributes that do not declare their own maximum.
    pub max_text_length: usize,
    /// Characters allowed in identifiers besides ASCII letters and digits.
    pub id_extra_chars: Vec<char>,
    /// Characters that may not appear in names.
    pub name_forbidden_chars: Vec<char>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_text_length: 4000,
            id_extra_chars: vec!['_', '-'],
            name_forbidden_chars: vec![',', ';', '|'],
        }
    }
}

impl ValidationConfig {
    pub fn is_id_char(&self, c: char) -> bool {
        c.is_ascii_alphanumeric() || self.id_extra_chars.contains(&c)
    }

    pub fn is_forbidden_in_name(&self, c: char) -> bool {
        self.name_forbidden_chars.contains(&c)
    }
}
