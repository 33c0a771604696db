//! Passphrase Strength Module
//!
//! Entropy estimate and strength classification for passphrases.

use serde::Serialize;

const LOWERCASE_POOL: u32 = 26;
const UPPERCASE_POOL: u32 = 26;
const DIGIT_POOL: u32 = 10;
const SYMBOL_POOL: u32 = 32;

/// Substrings that make a passphrase weak regardless of its length.
const WEAK_PATTERNS: &[&str] = &[
    "password", "123456", "qwerty", "letmein", "admin", "welcome", "abc123", "iloveyou",
    "monkey", "dragon",
];

/// Runs of this many identical characters force a weak rating.
const MAX_REPEAT_RUN: usize = 3;

// == Strength Level ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrengthLevel {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

// == Passphrase Strength ==
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassphraseStrength {
    pub level: StrengthLevel,
    pub entropy_bits: f64,
    pub pool_size: u32,
    /// Human readable hints for improving the passphrase
    pub feedback: Vec<String>,
}

impl PassphraseStrength {
    pub fn is_acceptable(&self) -> bool {
        self.level >= StrengthLevel::Strong
    }
}

/// Size of the character pool implied by the classes present in `passphrase`.
pub fn character_pool_size(passphrase: &str) -> u32 {
    let mut pool = 0;
    if passphrase.chars().any(|c| c.is_ascii_lowercase()) {
        pool += LOWERCASE_POOL;
    }
    if passphrase.chars().any(|c| c.is_ascii_uppercase()) {
        pool += UPPERCASE_POOL;
    }
    if passphrase.chars().any(|c| c.is_ascii_digit()) {
        pool += DIGIT_POOL;
    }
    if passphrase.chars().any(|c| !c.is_ascii_alphanumeric()) {
        pool += SYMBOL_POOL;
    }
    pool
}

/// `length * log2(pool)`, zero for an empty passphrase.
pub fn entropy_bits(passphrase: &str) -> f64 {
    let pool = character_pool_size(passphrase);
    if pool == 0 {
        return 0.0;
    }
    passphrase.chars().count() as f64 * f64::from(pool).log2()
}

// == Evaluate ==
/// Scores `passphrase`.
pub fn evaluate(passphrase: &str) -> PassphraseStrength {
    let length = passphrase.chars().count();
    let pool_size = character_pool_size(passphrase);
    let entropy = entropy_bits(passphrase);
    let mut feedback = Vec::new();

    let mut level = if length >= 16 && entropy >= 100.0 {
        StrengthLevel::VeryStrong
    } else if length >= 12 && entropy >= 70.0 {
        StrengthLevel::Strong
    } else if length >= 8 && entropy >= 45.0 {
        StrengthLevel::Medium
    } else {
        StrengthLevel::Weak
    };

    if length < 12 {
        feedback.push("Use at least 12 characters".to_string());
    }
    if pool_size < LOWERCASE_POOL + UPPERCASE_POOL + DIGIT_POOL + SYMBOL_POOL {
        feedback.push("Mix lowercase, uppercase, digits and symbols".to_string());
    }
    if has_repeated_run(passphrase) {
        level = StrengthLevel::Weak;
        feedback.push("Avoid repeating the same character".to_string());
    }
    if contains_weak_pattern(passphrase) {
        level = StrengthLevel::Weak;
        feedback.push("Avoid common words and keyboard patterns".to_string());
    }

    PassphraseStrength {
        level,
        entropy_bits: entropy,
        pool_size,
        feedback,
    }
}

fn has_repeated_run(passphrase: &str) -> bool {
    let mut run = 0;
    let mut previous = None;
    for c in passphrase.chars() {
        if Some(c) == previous {
            run += 1;
        } else {
            run = 1;
            previous = Some(c);
        }
        if run >= MAX_REPEAT_RUN {
            return true;
        }
    }
    false
}

fn contains_weak_pattern(passphrase: &str) -> bool {
    let lowered = passphrase.to_lowercase();
    WEAK_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
}
