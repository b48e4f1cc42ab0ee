//! Table normalisation and title extraction
//!
//! Model output is expected to be markdown tables only. The passes here
//! repair the usual deviations: HTML tags, bullets, prose outside the table
//! and an ITEM/CONTENIDO table emitted with its columns reversed.

use regex_lite::Regex;
use serde::Serialize;
use std::sync::OnceLock;

struct Patterns {
    br: Regex,
    paragraph_open: Regex,
    paragraph_close: Regex,
    tag: Regex,
    leading_bullet: Regex,
    inline_bullet: Regex,
    spaces: Regex,
    session_title: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            br: Regex::new(r"(?i)<br\s*/?>")?,
            paragraph_open: Regex::new(r"(?i)<p(\s[^>]*)?>")?,
            paragraph_close: Regex::new(r"(?i)</p>")?,
            tag: Regex::new(r"<[^>]+>")?,
            leading_bullet: Regex::new(r"^\s*[•*→▪▫○●-]\s+")?,
            inline_bullet: Regex::new(r"\s+[•→▪▫○●]\s*")?,
            spaces: Regex::new(r" {2,}")?,
            session_title: Regex::new(r"(?i)sesi[oóÓ]n\s+\d+\s*[:-]\s*([^\n.|]+)")?,
        })
    }
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match Patterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(e) => {
                tracing::error!(error = %e, "Table normalisation patterns failed to compile");
                None
            }
        })
        .as_ref()
}

/// Structural markers of a document: table rows and `|` delimiters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StructureProfile {
    pub rows: usize,
    pub delimiters: usize,
}

impl StructureProfile {
    pub fn of(text: &str) -> Self {
        let mut profile = Self::default();
        for line in text.lines() {
            let count = line.matches('|').count();
            profile.delimiters += count;
            if count >= 2 {
                profile.rows += 1;
            }
        }
        profile
    }

    /// True when this profile has at least the markers of `baseline`
    pub fn covers(&self, baseline: &StructureProfile) -> bool {
        self.rows >= baseline.rows && self.delimiters >= baseline.delimiters
    }
}

fn is_table_row(line: &str) -> bool {
    line.matches('|').count() >= 2
}

fn split_cells(line: &str) -> Vec<&str> {
    let inner = line.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(str::trim).collect()
}

fn join_cells(cells: &[&str]) -> String {
    let mut row = String::from("|");
    for cell in cells {
        if cell.is_empty() {
            row.push_str(" |");
        } else {
            row.push(' ');
            row.push_str(cell);
            row.push_str(" |");
        }
    }
    row
}

fn clean_title(raw: &str) -> String {
    let without_tags = match patterns() {
        Some(p) => p.tag.replace_all(raw, "").into_owned(),
        None => raw.to_string(),
    };
    without_tags.replace("**", "").trim().to_string()
}

/// Remove HTML and bullets. `<br>` becomes a space inside table rows and a
/// line break elsewhere; blank prose lines are dropped.
pub fn strip_markup(text: &str) -> String {
    let Some(p) = patterns() else {
        return text.to_string();
    };

    let mut lines = Vec::new();
    for line in text.lines() {
        if line.contains('|') {
            let line = p.br.replace_all(line, " ");
            let line = p.tag.replace_all(&line, "");
            let cells: Vec<String> = line
                .split('|')
                .map(|cell| {
                    let cell = p.leading_bullet.replace(cell, " ");
                    p.inline_bullet.replace_all(&cell, " ").into_owned()
                })
                .collect();
            lines.push(p.spaces.replace_all(&cells.join("|"), " ").into_owned());
        } else {
            let line = p.br.replace_all(line, "\n");
            let line = p.paragraph_close.replace_all(&line, "\n");
            let line = p.paragraph_open.replace_all(&line, "\n");
            let line = p.tag.replace_all(&line, "");
            for piece in line.split('\n') {
                let piece = p.leading_bullet.replace(piece, "");
                let piece = p.inline_bullet.replace_all(&piece, " ");
                let piece = piece.trim();
                if !piece.is_empty() {
                    lines.push(piece.to_string());
                }
            }
        }
    }
    lines.join("\n")
}

/// Put ITEM on the left of every ITEM/CONTENIDO table. When the header is
/// reversed, the first two cells of each row are swapped until the table ends.
pub fn fix_column_order(text: &str) -> String {
    let mut out = Vec::new();
    let mut in_item_table = false;
    let mut reversed = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.contains('|') {
            in_item_table = false;
            reversed = false;
            out.push(trimmed.to_string());
            continue;
        }

        let mut cells = split_cells(trimmed);
        if cells.len() < 2 {
            out.push(trimmed.to_string());
            continue;
        }

        let first = cells[0].to_uppercase();
        let second = cells[1].to_uppercase();
        let header = first.contains("ITEM") && second.contains("CONTENIDO");
        let reversed_header = first.contains("CONTENIDO") && second.contains("ITEM");

        if !(header || reversed_header || in_item_table) {
            reversed = false;
            out.push(trimmed.to_string());
            continue;
        }

        in_item_table = true;
        if header {
            reversed = false;
        } else if reversed_header {
            reversed = true;
        }
        if reversed {
            cells.swap(0, 1);
        }
        out.push(join_cells(&cells));
    }

    out.join("\n")
}

/// Drop prose before the first table and turn loose lines after it into
/// `| | text |` rows. A document without tables is returned trimmed.
pub fn enclose_loose_lines(text: &str) -> String {
    if !text.lines().any(is_table_row) {
        return text.trim().to_string();
    }

    let mut out = Vec::new();
    let mut inside = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if !inside {
            if is_table_row(trimmed) {
                inside = true;
                out.push(trimmed.to_string());
            }
            continue;
        }

        if trimmed.contains('|') {
            out.push(trimmed.to_string());
        } else if !trimmed.is_empty() {
            out.push(format!("| | {} |", trimmed));
        }
    }
    out.join("\n")
}

/// All normalisation passes, in order
pub fn normalize_document(text: &str) -> String {
    let stripped = strip_markup(text);
    let ordered = fix_column_order(&stripped);
    enclose_loose_lines(&ordered)
}

/// Value of the `TÍTULO DE LA UNIDAD` row, if any
pub fn extract_unit_title(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| is_table_row(line))
        .find_map(|line| {
            let cells = split_cells(line);
            if cells.len() < 2 {
                return None;
            }
            let label = curriforge_common::text::fold(cells[0]);
            if label.contains("titulo") && label.contains("unidad") {
                Some(clean_title(cells[1])).filter(|title| !title.is_empty())
            } else {
                None
            }
        })
}

/// `Sesión N: title` entries. Looks inside the session sequence first and
/// falls back to the whole document; titles of five characters or fewer are
/// discarded.
pub fn extract_session_titles(text: &str) -> Vec<String> {
    let Some(p) = patterns() else {
        return Vec::new();
    };

    let collect = |scope: &str| -> Vec<String> {
        p.session_title
            .captures_iter(scope)
            .filter_map(|caps| caps.get(1))
            .map(|m| clean_title(m.as_str()))
            .filter(|title| title.chars().count() > 5)
            .collect()
    };

    let sequence_start = text.lines().position(|line| {
        let folded = curriforge_common::text::fold(line);
        folded.contains("secuencia") && folded.contains("sesion")
    });

    if let Some(start) = sequence_start {
        let scope: Vec<&str> = text.lines().skip(start).collect();
        let titles = collect(&scope.join("\n"));
        if !titles.is_empty() {
            return titles;
        }
    }
    collect(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let raw = "<p>Introducción</p>\n\n| **ITEM** | Texto<br>con salto |\n- viñeta suelta\n";
        let cleaned = strip_markup(raw);
        assert_eq!(cleaned, "Introducción\n| **ITEM** | Texto con salto |\nviñeta suelta");
    }

    #[test]
    fn test_strip_markup_keeps_bold_and_separators() {
        let raw = "| ITEM | CONTENIDO |\n|------|-----------|\n| **TÍTULO** | • Uno • Dos |";
        let cleaned = strip_markup(raw);
        assert!(cleaned.contains("|------|-----------|"));
        assert!(cleaned.contains("**TÍTULO**"));
        assert!(!cleaned.contains('•'));
    }

    #[test]
    fn test_fix_reversed_columns() {
        let raw = "| CONTENIDO | ITEM |\n|-----------|------|\n| Energía | **TEMA** |\n\nfin";
        let fixed = fix_column_order(raw);
        let lines: Vec<&str> = fixed.lines().collect();
        assert_eq!(lines[0], "| ITEM | CONTENIDO |");
        assert_eq!(lines[1], "| ------ | ----------- |");
        assert_eq!(lines[2], "| **TEMA** | Energía |");
        assert_eq!(lines[4], "fin");
    }

    #[test]
    fn test_fix_leaves_other_tables() {
        let raw = "| COMPETENCIA | CAPACIDADES |\n|---|---|\n| Indaga | Problematiza |";
        assert_eq!(fix_column_order(raw), raw);
    }

    #[test]
    fn test_enclose_loose_lines() {
        let raw = "Aquí tienes la unidad:\n| ITEM | CONTENIDO |\n|------|-----------|\n| **TÍTULO** | Agua |\nTexto suelto";
        let enclosed = enclose_loose_lines(raw);
        assert!(enclosed.starts_with("| ITEM | CONTENIDO |"));
        assert!(enclosed.ends_with("| | Texto suelto |"));
    }

    #[test]
    fn test_enclose_without_table_keeps_prose() {
        assert_eq!(enclose_loose_lines("  solo texto \n"), "solo texto");
    }

    #[test]
    fn test_normalize_document_is_idempotent() {
        let raw = "Hola\n| CONTENIDO | ITEM |\n|---|---|\n| Agua <br> potable | **TÍTULO DE LA UNIDAD** |\nnota final";
        let once = normalize_document(raw);
        assert_eq!(normalize_document(&once), once);
        assert_eq!(extract_unit_title(&once).as_deref(), Some("Agua potable"));
    }

    #[test]
    fn test_extract_unit_title() {
        let doc = "| ITEM | CONTENIDO |\n|---|---|\n| **TÍTULO DE LA UNIDAD DIDÁCTICA** | <b>Cuidamos el agua</b> |";
        assert_eq!(extract_unit_title(doc).as_deref(), Some("Cuidamos el agua"));
        assert_eq!(extract_unit_title("| ITEM | CONTENIDO |"), None);
    }

    #[test]
    fn test_extract_session_titles() {
        let doc = "| **SITUACIÓN** | Sesión 9: no cuenta aquí |\n\
                   | **SECUENCIA DE SESIONES** | Sesión 1: Exploramos el agua. Sesión 2 - Medimos la temperatura. Sesión 3: Fin |";
        let titles = extract_session_titles(doc);
        assert_eq!(titles, vec!["Exploramos el agua", "Medimos la temperatura"]);
    }

    #[test]
    fn test_extract_session_titles_fallback() {
        let doc = "Sesión 1: Reconocemos ecosistemas\nsesion 2: Fin";
        assert_eq!(extract_session_titles(doc), vec!["Reconocemos ecosistemas"]);
    }

    #[test]
    fn test_structure_profile() {
        let profile = StructureProfile::of("| a | b |\n|---|---|\ntexto | suelto\n| c | d |");
        assert_eq!(profile, StructureProfile { rows: 3, delimiters: 10 });

        let half = StructureProfile::of("| a | b |\n|---|---|");
        assert!(!half.covers(&profile));
        assert!(profile.covers(&half));
    }
}
