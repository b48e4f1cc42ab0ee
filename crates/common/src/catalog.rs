//! National curriculum competency catalogue
//!
//! The 31 competencies of the Currículo Nacional de Educación Básica and the
//! mapping from curricular areas to competency numbers. Used to validate and
//! display the competency a document is built around.

use crate::text::fold;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Competency {
    pub number: u8,
    pub name: &'static str,
}

impl Competency {
    /// Display form used inside document tables: `COMPETENCIA N. Name`
    pub fn display(&self) -> String {
        format!("COMPETENCIA {}. {}", self.number, self.name)
    }
}

const fn competency(number: u8, name: &'static str) -> Competency {
    Competency { number, name }
}

pub static COMPETENCIES: [Competency; 31] = [
    competency(1, "Construye su identidad"),
    competency(2, "Asume una vida saludable"),
    competency(3, "Se desenvuelve de manera autónoma a través de su motricidad"),
    competency(4, "Se comunica oralmente en su lengua materna"),
    competency(5, "Lee diversos tipos de textos escritos en su lengua materna"),
    competency(6, "Escribe diversos tipos de textos en su lengua materna"),
    competency(7, "Se comunica en inglés como lengua extranjera"),
    competency(8, "Resuelve problemas de cantidad"),
    competency(9, "Resuelve problemas de regularidad, equivalencia y cambio"),
    competency(10, "Resuelve problemas de forma, movimiento y localización"),
    competency(11, "Resuelve problemas de gestión de datos e incertidumbre"),
    competency(12, "Indaga mediante métodos científicos para construir conocimientos"),
    competency(13, "Explica el mundo físico basándose en conocimientos sobre los seres vivos; materia y energía; biodiversidad, Tierra y universo"),
    competency(14, "Diseña y construye soluciones tecnológicas para resolver problemas de su entorno"),
    competency(15, "Gestiona proyectos de emprendimiento económico o social"),
    competency(16, "Se desenvuelve en entornos virtuales generados por las TIC"),
    competency(17, "Interpreta la realidad y se integra a través de las manifestaciones artístico-culturales"),
    competency(18, "Crea proyectos desde los lenguajes artísticos"),
    competency(19, "Construye interpretaciones históricas"),
    competency(20, "Gestiona responsablemente el espacio y el ambiente"),
    competency(21, "Gestiona responsablemente los recursos económicos"),
    competency(22, "Se valora a sí mismo"),
    competency(23, "Autorregula sus emociones"),
    competency(24, "Reflexiona y argumenta éticamente"),
    competency(25, "Vive su sexualidad de manera plena y responsable"),
    competency(26, "Interactúa con todas las personas"),
    competency(27, "Construye normas y asume acuerdos y leyes"),
    competency(28, "Maneja conflictos de manera constructiva"),
    competency(29, "Participa en acciones que promueven el bienestar común"),
    competency(30, "Asume la experiencia del encuentro personal y comunitario con Dios en su proyecto de vida en coherencia con su creencia religiosa"),
    competency(31, "Conoce a Dios y asume su identidad religiosa como persona digna, libre y trascendente, desarrollando su conciencia moral y orientando su vida desde su encuentro personal y comunitario con Dios"),
];

/// Folded area name → competency numbers. Order matters: the first entry
/// whose name contains, or is contained in, the requested area wins.
const AREA_MAP: &[(&str, &[u8])] = &[
    ("ciencia y tecnologia", &[12, 13, 14]),
    ("ciencia", &[12, 13, 14]),
    ("tecnologia", &[12, 13, 14]),
    ("matematica", &[8, 9, 10, 11]),
    ("comunicacion", &[4, 5, 6, 7]),
    ("educacion fisica", &[3]),
    ("arte y cultura", &[17, 18]),
    ("arte", &[17, 18]),
    ("cultura", &[17, 18]),
    ("historia", &[19]),
    ("geografia", &[20]),
    ("economia", &[21]),
    ("educacion religiosa", &[30, 31]),
    ("tutoria", &[1, 2, 22, 23, 24, 25, 26, 27, 28, 29]),
    ("educacion para el trabajo", &[15, 16]),
];

pub fn all() -> &'static [Competency] {
    &COMPETENCIES
}

pub fn by_number(number: u8) -> Option<&'static Competency> {
    COMPETENCIES.iter().find(|c| c.number == number)
}

/// Competencies whose name contains `query` (case and accent insensitive)
pub fn by_name(query: &str) -> Vec<&'static Competency> {
    let needle = fold(query.trim());
    if needle.is_empty() {
        return Vec::new();
    }
    COMPETENCIES
        .iter()
        .filter(|c| fold(c.name).contains(&needle))
        .collect()
}

/// Competencies of a curricular area; empty when the area is unknown
pub fn by_area(area: &str) -> Vec<&'static Competency> {
    let area = fold(area.trim());
    if area.is_empty() {
        return Vec::new();
    }

    let numbers = AREA_MAP
        .iter()
        .find(|(name, _)| area.contains(name) || name.contains(area.as_str()))
        .map(|(_, numbers)| *numbers)
        .or_else(|| keyword_fallback(&area))
        .unwrap_or(&[]);

    COMPETENCIES
        .iter()
        .filter(|c| numbers.contains(&c.number))
        .collect()
}

fn keyword_fallback(area: &str) -> Option<&'static [u8]> {
    if area.contains("cienc") || area.contains("tecnolog") {
        Some(&[12, 13, 14])
    } else if area.contains("matemat") {
        Some(&[8, 9, 10, 11])
    } else if area.contains("comunica") {
        Some(&[4, 5, 6, 7])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_is_numbered_in_order() {
        assert_eq!(all().len(), 31);
        for (index, c) in all().iter().enumerate() {
            assert_eq!(c.number as usize, index + 1);
        }
    }

    #[test]
    fn test_display_format() {
        let c = by_number(12).unwrap();
        assert_eq!(
            c.display(),
            "COMPETENCIA 12. Indaga mediante métodos científicos para construir conocimientos"
        );
        assert!(by_number(0).is_none());
        assert!(by_number(32).is_none());
    }

    #[test]
    fn test_by_area_accent_insensitive() {
        let numbers = |area: &str| by_area(area).iter().map(|c| c.number).collect::<Vec<_>>();
        assert_eq!(numbers("Ciencia y Tecnología"), vec![12, 13, 14]);
        assert_eq!(numbers("MATEMÁTICA"), vec![8, 9, 10, 11]);
        assert_eq!(numbers("Educación Religiosa"), vec![30, 31]);
        assert_eq!(numbers("tutoria").len(), 10);
        assert!(numbers("astronomía").is_empty());
        assert!(numbers("").is_empty());
    }

    #[test]
    fn test_keyword_fallback() {
        let found = by_area("Taller tecnológico");
        assert_eq!(found.first().map(|c| c.number), Some(12));
    }

    #[test]
    fn test_by_name_partial() {
        let found = by_name("lengua materna");
        assert_eq!(found.len(), 3);
        assert_eq!(by_name("INDAGA")[0].number, 12);
        assert!(by_name(" ").is_empty());
    }
}
