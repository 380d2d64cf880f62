//! Query planning: turns a `ResolvedQuery` into a dialect-agnostic `Select`
//! AST, choosing between the star-schema planner (single fact) and the
//! composite-fact planner (measures spanning multiple facts) based on
//! `ResolvedQuery::requires_cfl`.

pub mod cfl;
pub mod star;

use crate::ast::Select;
use crate::error::{ObmlError, Result};
use crate::model::SemanticModel;
use crate::resolved::ResolvedQuery;

pub fn plan(resolved: &ResolvedQuery, model: &SemanticModel) -> Result<Select> {
    if resolved.requires_cfl {
        cfl::CflPlanner::new()
            .plan(resolved, model)
            .map_err(|e| ObmlError::Planning(e.0))
    } else {
        Ok(star::StarSchemaPlanner::new().plan(resolved, model))
    }
}
