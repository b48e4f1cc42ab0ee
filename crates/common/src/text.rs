//! Spanish text folding shared by retrieval and catalogue lookups

/// Lowercase and strip Spanish diacritics (`Evaluación` → `evaluacion`).
///
/// `ñ` is kept; it is a distinct letter, not an accented `n`.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            other => other,
        })
        .collect()
}

/// Fold, then split on anything that is not a letter or digit.
///
/// Underscores separate words, so `ciencia_tecnologia` yields two words.
pub fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(fold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold() {
        assert_eq!(fold("Evaluación FORMATIVA"), "evaluacion formativa");
        assert_eq!(fold("Año"), "año");
        assert_eq!(fold("Pingüino"), "pinguino");
    }

    #[test]
    fn test_words_split_on_punctuation_and_underscore() {
        let collected: Vec<String> = words("ciencia_tecnologia, ¿Indagación?").collect();
        assert_eq!(collected, vec!["ciencia", "tecnologia", "indagacion"]);
        assert_eq!(words("  ").count(), 0);
    }
}
