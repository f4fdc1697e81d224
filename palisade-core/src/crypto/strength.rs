//! Password strength analysis and entropy estimation

/// Strength rating for a password
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthRating {
    VeryWeak,
    Weak,
    Fair,
    Good,
    Strong,
    VeryStrong,
}

impl StrengthRating {
    /// Numeric score from 0 to 5
    pub fn score(&self) -> u8 {
        match self {
            StrengthRating::VeryWeak => 0,
            StrengthRating::Weak => 1,
            StrengthRating::Fair => 2,
            StrengthRating::Good => 3,
            StrengthRating::Strong => 4,
            StrengthRating::VeryStrong => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrengthRating::VeryWeak => "Very Weak",
            StrengthRating::Weak => "Weak",
            StrengthRating::Fair => "Fair",
            StrengthRating::Good => "Good",
            StrengthRating::Strong => "Strong",
            StrengthRating::VeryStrong => "Very Strong",
        }
    }

    fn from_entropy(bits: f64) -> Self {
        if bits < 28.0 {
            StrengthRating::VeryWeak
        } else if bits < 36.0 {
            StrengthRating::Weak
        } else if bits < 60.0 {
            StrengthRating::Fair
        } else if bits < 80.0 {
            StrengthRating::Good
        } else if bits < 100.0 {
            StrengthRating::Strong
        } else {
            StrengthRating::VeryStrong
        }
    }
}

/// Result of analyzing a candidate password
#[derive(Debug, Clone)]
pub struct StrengthReport {
    /// Overall strength rating
    pub rating: StrengthRating,
    /// Estimated entropy in bits
    pub entropy_bits: f64,
    /// Estimated time to crack (seconds, assuming 10 billion guesses/sec)
    pub crack_time_seconds: f64,
    /// Password length in characters
    pub length: usize,
    /// Weaknesses found in the password
    pub warnings: Vec<String>,
}

impl StrengthReport {
    /// Human-readable crack time
    pub fn crack_time_human(&self) -> String {
        const LADDER: &[(f64, f64, &str)] = &[
            (60.0, 1.0, "seconds"),
            (3_600.0, 60.0, "minutes"),
            (86_400.0, 3_600.0, "hours"),
            (31_536_000.0, 86_400.0, "days"),
            (3_153_600_000.0, 31_536_000.0, "years"),
        ];

        let seconds = self.crack_time_seconds;
        if seconds < 1.0 {
            return "instantly".to_string();
        }
        for &(limit, divisor, unit) in LADDER {
            if seconds < limit {
                return format!("{} {unit}", (seconds / divisor).floor());
            }
        }
        "centuries".to_string()
    }
}

/// Estimate password strength from length and character variety.
///
/// Entropy model: `E = L * log2(R)` where `L` is the length and `R` the
/// size of the smallest standard alphabet covering the observed classes.
pub fn analyze_password(password: &str) -> StrengthReport {
    let length = password.chars().count();
    let mut warnings = Vec::new();

    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digits = password.chars().any(|c| c.is_ascii_digit());
    let has_symbols = password.chars().any(|c| !c.is_ascii_alphanumeric());

    let mut charset_size = 0u32;
    let mut missing = Vec::new();
    for (present, size, label) in [
        (has_lowercase, 26, "lowercase letters"),
        (has_uppercase, 26, "uppercase letters"),
        (has_digits, 10, "digits"),
        (has_symbols, 32, "symbols"),
    ] {
        if present {
            charset_size += size;
        } else {
            missing.push(label);
        }
    }

    let entropy_bits = if charset_size > 0 {
        (length as f64) * f64::from(charset_size).log2()
    } else {
        0.0
    };

    let guesses_per_second = 10_000_000_000.0;
    let crack_time_seconds = if entropy_bits > 0.0 {
        2_f64.powf(entropy_bits) / guesses_per_second
    } else {
        0.0
    };

    if length < 8 {
        warnings.push("too short, use at least 8 characters".to_string());
    } else if length < 12 {
        warnings.push("could be longer, 12+ characters is better".to_string());
    }
    if !missing.is_empty() && !password.is_empty() {
        warnings.push(format!("missing character classes: {}", missing.join(", ")));
    }
    if password.to_lowercase().contains("password") {
        warnings.push("contains the word 'password'".to_string());
    }

    let chars: Vec<char> = password.chars().collect();
    if chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2]) {
        warnings.push("contains repeating characters".to_string());
    }
    let sequential = chars.windows(3).any(|w| {
        let (a, b, c) = (w[0] as u32, w[1] as u32, w[2] as u32);
        (a + 1 == b && b + 1 == c) || (a == b + 1 && b == c + 1)
    });
    if sequential {
        warnings.push("contains sequential characters (like 'abc' or '123')".to_string());
    }

    StrengthReport {
        rating: StrengthRating::from_entropy(entropy_bits),
        entropy_bits,
        crack_time_seconds,
        length,
        warnings,
    }
}
