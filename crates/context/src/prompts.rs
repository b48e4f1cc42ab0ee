//! Prompt templates
//!
//! One draft template per document kind, a shared critique template driven
//! by a single criterion, and the revision template. Every template asks for
//! markdown tables only so the structural check and the table normaliser
//! have something to hold on to.

use curriforge_common::catalog;
use curriforge_common::errors::{AppError, Result};
use curriforge_search::RetrievalParams;
use serde::{Deserialize, Serialize};

/// Kind of curricular document to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Six-column programme table plus an ITEM/CONTENIDO appendix
    CurricularProgram,
    LearningUnit,
    LearningSession,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::CurricularProgram => "curricular_program",
            DocumentKind::LearningUnit => "learning_unit",
            DocumentKind::LearningSession => "learning_session",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DocumentKind::CurricularProgram => "programación curricular",
            DocumentKind::LearningUnit => "unidad didáctica",
            DocumentKind::LearningSession => "sesión de aprendizaje",
        }
    }
}

/// Kind-specific fields of a generation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentDetails {
    #[serde(default)]
    pub capacities: Option<String>,

    #[serde(default)]
    pub contents: Option<String>,

    /// Inicial, Primaria or Secundaria
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub classroom_section: Option<String>,

    /// Free text, e.g. "90 minutos"
    #[serde(default)]
    pub duration: Option<String>,

    #[serde(default)]
    pub unit_title: Option<String>,

    #[serde(default)]
    pub session_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub kind: DocumentKind,

    #[serde(flatten)]
    pub params: RetrievalParams,

    #[serde(flatten)]
    pub details: DocumentDetails,

    /// Text of a user-supplied reference document
    #[serde(default)]
    pub reference_document: Option<String>,
}

const DEFAULT_LEVEL: &str = "Secundaria";
const DEFAULT_PROGRAM_AREA: &str = "Ciencia y Tecnología";

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn or_blank(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or("")
}

impl GenerationRequest {
    pub fn new(kind: DocumentKind, params: RetrievalParams) -> Self {
        Self {
            kind,
            params,
            details: DocumentDetails::default(),
            reference_document: None,
        }
    }

    /// Check the fields each document kind needs
    pub fn validate(&self) -> Result<()> {
        if let Some(grade) = self.params.grade {
            if !(1..=6).contains(&grade) {
                return Err(AppError::Validation {
                    message: format!("grade must be between 1 and 6, got {}", grade),
                    field: Some("grade".to_string()),
                });
            }
        }

        let details = &self.details;
        let required = match self.kind {
            DocumentKind::CurricularProgram => vec![
                ("grade", self.params.grade.is_some()),
                ("competency", present(&self.params.competency)),
                ("capacities", present(&details.capacities)),
                ("contents", present(&details.contents)),
            ],
            DocumentKind::LearningUnit => vec![
                ("area", present(&self.params.area)),
                ("grade", self.params.grade.is_some()),
            ],
            DocumentKind::LearningSession => vec![
                ("unit_title", present(&details.unit_title)),
                ("session_title", present(&details.session_title)),
                ("grade", self.params.grade.is_some()),
                ("duration", present(&details.duration)),
            ],
        };

        match required.into_iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(AppError::MissingField {
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn level(&self) -> &str {
        self.details
            .level
            .as_deref()
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or(DEFAULT_LEVEL)
    }

    fn grade_label(&self) -> String {
        self.params
            .grade
            .map(|grade| format!("{}°", grade))
            .unwrap_or_default()
    }

    /// Competency as it should appear in the document. A catalogue number or
    /// an unambiguous name resolves to `COMPETENCIA N. Name`.
    pub fn competency_line(&self) -> Option<String> {
        let raw = self.params.competency.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Some(found) = raw.parse::<u8>().ok().and_then(catalog::by_number) {
            return Some(found.display());
        }
        match catalog::by_name(raw).as_slice() {
            [single] => Some(single.display()),
            _ => Some(raw.to_string()),
        }
    }

    /// Competencies of the requested area, for the unit template
    fn area_competencies(&self) -> Vec<String> {
        self.params
            .area
            .as_deref()
            .map(catalog::by_area)
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.display())
            .collect()
    }
}

const TABLE_RULES: &str = "REGLAS ESTRICTAS DE FORMATO:
1. SOLO genera tablas en formato markdown, sin texto antes ni después
2. TODO el contenido debe estar dentro de las celdas
3. NO uses etiquetas HTML (<br>, <p>, etc.)
4. NO uses viñetas (•, -, *, →) ni listas; solo texto plano dentro de las celdas
5. Cada fila debe estar en una sola línea, con | separando las columnas
6. En las tablas ITEM/CONTENIDO, ITEM va SIEMPRE a la izquierda y CONTENIDO a la derecha";

const PROGRAM_FORMAT: &str = "FORMATO REQUERIDO - TABLA PRINCIPAL:
| COMPETENCIA | CAPACIDADES | CONTENIDOS | DESEMPEÑOS | CRITERIOS DE EVALUACIÓN | INSTRUMENTOS DE EVALUACIÓN |
|-------------|-------------|------------|------------|-------------------------|----------------------------|
| [contenido] | [contenido] | [contenido] | [contenido] | [contenido] | [contenido] |

SECCIONES ADICIONALES:
| ITEM | CONTENIDO |
|------|-----------|
| **COMPETENCIAS TRANSVERSALES** | Se desenvuelve en entornos virtuales generados por las TIC y Gestiona su aprendizaje de manera autónoma |
| **ENFOQUES TRANSVERSALES** | Valores y comportamientos observables |
| **SECUENCIA DE SESIONES DE APRENDIZAJE** | Sesión 1: [título]. Actividades: [descripción]. Sesión 2: [título]. Actividades: [descripción]. Hasta 6 sesiones |";

const UNIT_FORMAT: &str = "FORMATO REQUERIDO:
| ITEM | CONTENIDO |
|------|-----------|
| **TÍTULO DE LA UNIDAD DIDÁCTICA** | Título completo |
| **SITUACIÓN SIGNIFICATIVA** | Contexto real completo |
| **COMPETENCIAS TRANSVERSALES** | Estándar e instrumento de cada competencia transversal |
| **COMPETENCIAS DE ÁREA, CAPACIDADES Y DESEMPEÑOS PRECISADOS** | Competencia, capacidades y entre 8 y 12 desempeños observables |
| **EVIDENCIAS DE APRENDIZAJE** | Evidencias con su descripción |
| **INSTRUMENTOS DE EVALUACIÓN** | Rúbricas con niveles Inicio, Proceso, Logrado y Destacado |
| **VALORES Y ENFOQUES TRANSVERSALES** | Valores y enfoques |
| **SECUENCIA DE SESIONES** | Sesión 1: [título, actividades, tiempo, recursos]. Sesión 2: [...]. Entre 4 y 6 sesiones |";

const SESSION_FORMAT: &str = "FORMATO REQUERIDO:
| ITEM | CONTENIDO |
|------|-----------|
| **DATOS INFORMATIVOS** | Área curricular, grado y sección, nivel, duración, fecha de aplicación |
| **SITUACIÓN SIGNIFICATIVA** | Contexto real y motivador |
| **COMPETENCIAS, CAPACIDADES Y DESEMPEÑOS PRECISADOS** | Competencia, capacidades y desempeños |
| **CRITERIOS DE EVALUACIÓN** | Criterios con su descripción |
| **EVIDENCIA DE APRENDIZAJE** | Descripción de la evidencia |
| **INSTRUMENTO DE EVALUACIÓN** | Rúbrica o lista de cotejo completa |
| **SECUENCIA DIDÁCTICA** | A. INICIO (20% del tiempo): actividades y tiempo. B. DESARROLLO (60% del tiempo): actividades y tiempo. C. CIERRE (20% del tiempo): actividades y tiempo |
| **MATERIALES Y RECURSOS** | Materiales para docente y estudiantes, recursos |
| **REFLEXIÓN SOBRE LA ACTIVIDAD** | Dificultades, mejoras y ajustes |";

/// Builds the text sent to the model for each step
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    reference_excerpt_chars: usize,
}

impl PromptBuilder {
    pub fn new(reference_excerpt_chars: usize) -> Self {
        Self {
            reference_excerpt_chars,
        }
    }

    /// Draft prompt: task, structured fields, optional context block and
    /// optional reference excerpt
    pub fn draft(&self, request: &GenerationRequest, context: Option<&str>) -> String {
        let mut prompt = self.task_intro(request);

        if let Some(context) = context {
            prompt.push_str(&format!(
                "\n\nCONTEXTO DE LOS DOCUMENTOS OFICIALES:\n---\n{}\n---\nBasa el documento en este contexto cuando sea pertinente.",
                context.trim()
            ));
        }

        if let Some(reference) = request
            .reference_document
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
        {
            prompt.push_str(&format!(
                "\n\nDOCUMENTO DE REFERENCIA:\n---\nEl usuario proporcionó este documento. Úsalo como base y adáptalo a los requerimientos indicados.\n\n{}\n---",
                excerpt(reference, self.reference_excerpt_chars)
            ));
        }

        prompt.push_str("\n\n");
        prompt.push_str(&self.base_information(request));

        let format = match request.kind {
            DocumentKind::CurricularProgram => PROGRAM_FORMAT,
            DocumentKind::LearningUnit => UNIT_FORMAT,
            DocumentKind::LearningSession => SESSION_FORMAT,
        };
        prompt.push_str("\n\n");
        prompt.push_str(format);
        prompt.push_str("\n\n");
        prompt.push_str(TABLE_RULES);
        prompt
    }

    /// Critique prompt: the current document and exactly one criterion
    pub fn critique(&self, request: &GenerationRequest, document: &str, criterion: &str) -> String {
        let keep = match request.kind {
            DocumentKind::CurricularProgram => {
                "- La tabla principal con sus 6 columnas\n- Las secciones adicionales en tablas | ITEM | CONTENIDO |"
            }
            _ => "- La tabla | ITEM | CONTENIDO | con todas sus filas",
        };

        format!(
            "Eres especialista en {kind} y evaluación educativa.\n\n\
             Aquí tienes el documento que necesita mejoras:\n---\n{document}\n---\n\n\
             Genera una versión nueva y mejorada. Enfócate específicamente en: \"{criterion}\"\n\n\
             MANTENER:\n{keep}\n- La estructura general del documento\n- ITEM siempre a la izquierda y CONTENIDO a la derecha\n\n\
             MEJORAR:\n- La calidad pedagógica según el criterio indicado\n- La pertinencia para estudiantes de {grade} grado de {level}\n- La claridad y viabilidad de lo que se evalúa\n\n\
             {rules}",
            kind = request.kind.display_name(),
            document = document.trim(),
            criterion = criterion,
            keep = keep,
            grade = request.grade_label(),
            level = request.level(),
            rules = TABLE_RULES,
        )
    }

    /// Revision prompt: the whole document verbatim plus the user's instruction
    pub fn revision(&self, kind: DocumentKind, document: &str, instruction: &str) -> String {
        format!(
            "Eres especialista en {kind}. Modifica el siguiente documento según la instrucción del docente.\n\n\
             DOCUMENTO ACTUAL:\n---\n{document}\n---\n\n\
             INSTRUCCIÓN: {instruction}\n\n\
             Devuelve SOLO el documento modificado completo. Conserva todas las tablas, filas y columnas existentes; \
             cambia únicamente lo que pide la instrucción.\n\n\
             {rules}",
            kind = kind.display_name(),
            document = document,
            instruction = instruction.trim(),
            rules = TABLE_RULES,
        )
    }

    fn task_intro(&self, request: &GenerationRequest) -> String {
        let grade = request.grade_label();
        match request.kind {
            DocumentKind::CurricularProgram => format!(
                "Actúa como especialista en programación curricular. Crea la programación curricular para estudiantes de {} grado de {} del área de {}.",
                grade,
                request.level(),
                Some(or_blank(&request.params.area))
                    .filter(|area| !area.is_empty())
                    .unwrap_or(DEFAULT_PROGRAM_AREA),
            ),
            DocumentKind::LearningUnit => format!(
                "Actúa como especialista en diseño curricular. Crea una unidad didáctica completa para el área de {} del {} grado de {}.",
                or_blank(&request.params.area),
                grade,
                request.level().to_uppercase(),
            ),
            DocumentKind::LearningSession => format!(
                "Actúa como especialista en diseño de sesiones de aprendizaje. Crea una sesión de aprendizaje completa y detallada para {} - {} grado.",
                request.level(),
                grade,
            ),
        }
    }

    fn base_information(&self, request: &GenerationRequest) -> String {
        let details = &request.details;
        let mut lines = vec![format!("GRADO: {} de {}", request.grade_label(), request.level())];

        if let Some(area) = request.params.area.as_deref().filter(|a| !a.trim().is_empty()) {
            lines.push(format!("ÁREA: {}", area.trim()));
        }
        if let Some(competency) = request.competency_line() {
            lines.push(format!("COMPETENCIA: {}", competency));
        }

        match request.kind {
            DocumentKind::CurricularProgram => {
                lines.push(format!("CAPACIDADES: {}", or_blank(&details.capacities)));
                lines.push(format!("CONTENIDOS: {}", or_blank(&details.contents)));
            }
            DocumentKind::LearningUnit => {
                let competencies = request.area_competencies();
                if request.params.competency.is_none() && !competencies.is_empty() {
                    lines.push(format!("COMPETENCIAS DEL ÁREA: {}", competencies.join("; ")));
                }
            }
            DocumentKind::LearningSession => {
                lines.push(format!("TÍTULO DE LA UNIDAD: {}", or_blank(&details.unit_title)));
                lines.push(format!("TÍTULO DE LA SESIÓN: {}", or_blank(&details.session_title)));
                if present(&details.classroom_section) {
                    lines.push(format!("SECCIÓN: {}", or_blank(&details.classroom_section)));
                }
                lines.push(format!("DURACIÓN: {}", or_blank(&details.duration)));
            }
        }

        if let Some(topic) = request.params.topic.as_deref().filter(|t| !t.trim().is_empty()) {
            lines.push(format!("TEMA: {}", topic.trim()));
        }

        format!("INFORMACIÓN BASE:\n---\n{}\n---", lines.join("\n"))
    }
}

/// First `max_chars` characters of `text`
fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_request() -> GenerationRequest {
        GenerationRequest::new(
            DocumentKind::LearningUnit,
            RetrievalParams {
                grade: Some(3),
                area: Some("Ciencia y Tecnología".to_string()),
                competency: None,
                topic: Some("energía".to_string()),
            },
        )
    }

    #[test]
    fn test_validate_required_fields() {
        assert!(unit_request().validate().is_ok());

        let mut missing_area = unit_request();
        missing_area.params.area = Some("  ".to_string());
        match missing_area.validate() {
            Err(AppError::MissingField { field }) => assert_eq!(field, "area"),
            other => panic!("unexpected {:?}", other),
        }

        let session = GenerationRequest::new(DocumentKind::LearningSession, RetrievalParams::default());
        assert!(matches!(session.validate(), Err(AppError::MissingField { .. })));

        let mut bad_grade = unit_request();
        bad_grade.params.grade = Some(9);
        assert!(matches!(bad_grade.validate(), Err(AppError::Validation { .. })));
    }

    #[test]
    fn test_request_deserializes_flat() {
        let request: GenerationRequest = serde_json::from_value(serde_json::json!({
            "kind": "learning_session",
            "grade": 2,
            "unit_title": "Cuidamos el agua",
            "session_title": "Medimos el consumo",
            "duration": "90 minutos"
        }))
        .unwrap();

        assert_eq!(request.kind, DocumentKind::LearningSession);
        assert_eq!(request.params.grade, Some(2));
        assert_eq!(request.level(), "Secundaria");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_competency_line_uses_catalogue() {
        let mut request = unit_request();
        request.params.competency = Some("12".to_string());
        assert_eq!(
            request.competency_line().as_deref(),
            Some("COMPETENCIA 12. Indaga mediante métodos científicos para construir conocimientos")
        );

        request.params.competency = Some("algo propio".to_string());
        assert_eq!(request.competency_line().as_deref(), Some("algo propio"));
    }

    #[test]
    fn test_draft_prompt_sections() {
        let builder = PromptBuilder::new(10);
        let mut request = unit_request();
        request.reference_document = Some("ABCDEFGHIJKLMNOP".to_string());

        let prompt = builder.draft(&request, Some("DOCUMENTO 1 (Relevancia: 3.00)"));
        assert!(prompt.contains("unidad didáctica"));
        assert!(prompt.contains("DOCUMENTO 1 (Relevancia: 3.00)"));
        assert!(prompt.contains("ABCDEFGHIJ\n"));
        assert!(!prompt.contains("ABCDEFGHIJK"));
        assert!(prompt.contains("COMPETENCIA 12."));
        assert!(prompt.contains("| **TÍTULO DE LA UNIDAD DIDÁCTICA** |"));

        let bare = builder.draft(&unit_request(), None);
        assert!(!bare.contains("CONTEXTO DE LOS DOCUMENTOS OFICIALES"));
        assert!(!bare.contains("DOCUMENTO DE REFERENCIA"));
    }

    #[test]
    fn test_critique_and_revision_embed_document() {
        let builder = PromptBuilder::new(3000);
        let document = "| ITEM | CONTENIDO |\n|---|---|\n| A | B |";

        let critique = builder.critique(&unit_request(), document, "Mejora los desempeños");
        assert!(critique.contains(document));
        assert!(critique.contains("\"Mejora los desempeños\""));

        let revision = builder.revision(DocumentKind::LearningUnit, document, "  agrega una sesión ");
        assert!(revision.contains(document));
        assert!(revision.contains("INSTRUCCIÓN: agrega una sesión\n"));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("áéíóú", 3), "áéí");
        assert_eq!(excerpt("abc", 10), "abc");
    }
}
