use zxcvbn::zxcvbn;

/// Lowest zxcvbn score (0..=4) a new password may have.
pub const MIN_ACCEPTED_SCORE: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrengthReport {
    pub score: u8,
    pub suggestions: Vec<String>,
}

pub fn estimate_strength(password: &str, user_inputs: &[&str]) -> StrengthReport {
    let entropy = zxcvbn(password, user_inputs);
    let suggestions = entropy
        .feedback()
        .map(|feedback| {
            feedback
                .warning()
                .map(|warning| warning.to_string())
                .into_iter()
                .chain(feedback.suggestions().iter().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default();
    StrengthReport {
        score: u8::from(entropy.score()),
        suggestions,
    }
}
