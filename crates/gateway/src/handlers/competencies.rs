//! Competency catalogue handler

use axum::{extract::Query, Json};
use curriforge_common::catalog::{self, Competency};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct CompetencyQuery {
    /// Curricular area, e.g. "Ciencia y Tecnología"
    pub area: Option<String>,
    /// Substring of the competency name
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct CompetencyItem {
    pub number: u8,
    pub name: &'static str,
    pub display: String,
}

impl From<&Competency> for CompetencyItem {
    fn from(c: &Competency) -> Self {
        Self {
            number: c.number,
            name: c.name,
            display: c.display(),
        }
    }
}

#[derive(Serialize)]
pub struct CompetencyResponse {
    pub total: usize,
    pub competencies: Vec<CompetencyItem>,
}

/// List competencies, optionally filtered by area or name
pub async fn list_competencies(Query(query): Query<CompetencyQuery>) -> Json<CompetencyResponse> {
    let found: Vec<&Competency> = match (query.area.as_deref(), query.name.as_deref()) {
        (Some(area), _) if !area.trim().is_empty() => catalog::by_area(area),
        (_, Some(name)) if !name.trim().is_empty() => catalog::by_name(name),
        _ => catalog::all().iter().collect(),
    };

    let competencies: Vec<CompetencyItem> = found.into_iter().map(CompetencyItem::from).collect();
    Json(CompetencyResponse {
        total: competencies.len(),
        competencies,
    })
}
