use unicode_normalization::UnicodeNormalization;

use crate::models::AnswerType;

/// Compares a player's answer against a scene's correct answer.
///
/// Both sides are normalised first (NFKC, lowercase, punctuation stripped,
/// whitespace collapsed). Multiple-choice answers must then match exactly;
/// free-text answers may be off by one edit per five characters.
pub struct AnswerMatcher;

impl AnswerMatcher {
    pub fn is_match(answer_type: AnswerType, submitted: &str, correct: &str) -> bool {
        let submitted = Self::normalize(submitted);
        let correct = Self::normalize(correct);

        if submitted.is_empty() {
            return false;
        }
        if submitted == correct {
            return true;
        }

        match answer_type {
            AnswerType::MultipleChoice => false,
            AnswerType::FreeText => {
                let tolerance = Self::tolerance(correct.chars().count());
                tolerance > 0 && Self::edit_distance(&submitted, &correct) <= tolerance
            }
        }
    }

    /// Canonical form used for comparison
    pub fn normalize(input: &str) -> String {
        let folded: String = input
            .nfkc()
            .flat_map(char::to_lowercase)
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();

        folded.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Allowed edits for a correct answer of `len` characters
    fn tolerance(len: usize) -> usize {
        if len < 4 {
            0
        } else {
            (len / 5).max(1)
        }
    }

    /// Levenshtein distance over chars
    fn edit_distance(a: &str, b: &str) -> usize {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();

        let mut prev: Vec<usize> = (0..=b.len()).collect();
        let mut curr = vec![0; b.len() + 1];

        for (i, ca) in a.iter().enumerate() {
            curr[0] = i + 1;
            for (j, cb) in b.iter().enumerate() {
                let substitution = prev[j] + usize::from(ca != cb);
                curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
            }
            std::mem::swap(&mut prev, &mut curr);
        }

        prev[b.len()]
    }
}
