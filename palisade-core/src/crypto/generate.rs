//! Secure random password generator

use crate::crypto::{CryptoError, Result};
use rand::seq::SliceRandom;
use rand::Rng;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Characters easily confused with each other (l, 1, I, O, 0)
const AMBIGUOUS: &[u8] = b"l1IO0";

/// Configuration for password generation
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    /// Length of the password to generate
    pub length: usize,
    /// Include lowercase letters
    pub lowercase: bool,
    /// Include uppercase letters
    pub uppercase: bool,
    /// Include digits
    pub digits: bool,
    /// Include symbols
    pub symbols: bool,
    /// Exclude ambiguous characters
    pub exclude_ambiguous: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            length: 16,
            lowercase: true,
            uppercase: true,
            digits: true,
            symbols: true,
            exclude_ambiguous: true,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the password length
    pub fn length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Include lowercase letters
    pub fn with_lowercase(mut self, include: bool) -> Self {
        self.lowercase = include;
        self
    }

    /// Include uppercase letters
    pub fn with_uppercase(mut self, include: bool) -> Self {
        self.uppercase = include;
        self
    }

    /// Include digits
    pub fn with_digits(mut self, include: bool) -> Self {
        self.digits = include;
        self
    }

    /// Include symbols
    pub fn with_symbols(mut self, include: bool) -> Self {
        self.symbols = include;
        self
    }

    /// Exclude ambiguous characters
    pub fn exclude_ambiguous(mut self, exclude: bool) -> Self {
        self.exclude_ambiguous = exclude;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.length < 4 {
            return Err(CryptoError::Primitive(
                "password length must be at least 4 characters".to_string(),
            ));
        }
        if !self.lowercase && !self.uppercase && !self.digits && !self.symbols {
            return Err(CryptoError::Primitive(
                "at least one character class must be enabled".to_string(),
            ));
        }
        Ok(())
    }

    fn classes(&self) -> [(bool, &'static [u8]); 4] {
        [
            (self.lowercase, LOWERCASE),
            (self.uppercase, UPPERCASE),
            (self.digits, DIGITS),
            (self.symbols, SYMBOLS),
        ]
    }
}

/// Generate a random password.
///
/// The result contains at least one character from every enabled class,
/// with the remainder drawn uniformly from the combined pool and the whole
/// password shuffled afterwards.
pub fn generate_password(config: &GeneratorConfig) -> Result<String> {
    config.validate()?;

    let mut rng = rand::thread_rng();
    let mut pool = Vec::new();
    let mut password = Vec::with_capacity(config.length);

    for (enabled, chars) in config.classes() {
        if !enabled {
            continue;
        }
        let class: Vec<u8> = chars
            .iter()
            .copied()
            .filter(|c| !config.exclude_ambiguous || !AMBIGUOUS.contains(c))
            .collect();
        if class.is_empty() {
            continue;
        }
        if password.len() < config.length {
            password.push(class[rng.gen_range(0..class.len())]);
        }
        pool.extend_from_slice(&class);
    }

    if pool.is_empty() {
        return Err(CryptoError::Primitive(
            "character pool is empty after applying filters".to_string(),
        ));
    }

    while password.len() < config.length {
        password.push(pool[rng.gen_range(0..pool.len())]);
    }

    password.shuffle(&mut rng);
    Ok(password.into_iter().map(char::from).collect())
}

/// Generate a password with the default configuration
pub fn generate_secure_password() -> Result<String> {
    generate_password(&GeneratorConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_password_length() {
        let password = generate_secure_password().unwrap();
        assert_eq!(password.len(), 16);
    }

    #[test]
    fn test_custom_length() {
        let config = GeneratorConfig::default().length(32);
        let password = generate_password(&config).unwrap();
        assert_eq!(password.len(), 32);
    }

    #[test]
    fn test_every_enabled_class_is_represented() {
        let password = generate_password(&GeneratorConfig::default()).unwrap();

        assert!(password.chars().any(|c| c.is_ascii_lowercase()));
        assert!(password.chars().any(|c| c.is_ascii_uppercase()));
        assert!(password.chars().any(|c| c.is_ascii_digit()));
        assert!(password.chars().any(|c| !c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_letters_only() {
        let config = GeneratorConfig::default()
            .with_digits(false)
            .with_symbols(false)
            .length(12);
        let password = generate_password(&config).unwrap();

        assert_eq!(password.len(), 12);
        assert!(password.chars().all(|c| c.is_alphabetic()));
    }

    #[test]
    fn test_ambiguous_characters_excluded() {
        let config = GeneratorConfig::default().exclude_ambiguous(true).length(64);
        let password = generate_password(&config).unwrap();

        assert!(!password.chars().any(|c| matches!(c, 'l' | '1' | 'I' | 'O' | '0')));
    }

    #[test]
    fn test_length_too_short_rejected() {
        let config = GeneratorConfig::default().length(2);
        assert!(generate_password(&config).is_err());
    }

    #[test]
    fn test_no_classes_rejected() {
        let config = GeneratorConfig::default()
            .with_lowercase(false)
            .with_uppercase(false)
            .with_digits(false)
            .with_symbols(false);
        assert!(generate_password(&config).is_err());
    }

    #[test]
    fn test_passwords_are_unique() {
        let p1 = generate_secure_password().unwrap();
        let p2 = generate_secure_password().unwrap();
        assert_ne!(p1, p2);
    }
}
