// braid/src/commands/schema.rs
//
// USE CASE: Validate a plan document, reporting every issue at once.

use std::path::Path;

use braid_core::domain::error::DomainError;
use braid_core::domain::plan::load_plan;
use braid_core::BraidError;

pub fn execute(file: &Path) -> Result<i32, BraidError> {
    let text = std::fs::read_to_string(file)?;

    match load_plan(&text) {
        Ok(plan) => {
            println!(
                "✅ {} is a valid plan ({} item(s), target '{}')",
                file.display(),
                plan.items.len(),
                plan.target
            );
            Ok(0)
        }
        Err(DomainError::SchemaValidation { issues }) => {
            eprintln!("❌ {}: {} issue(s)", file.display(), issues.len());
            for issue in &issues {
                eprintln!("   - {} [{}]: {}", issue.path, issue.code, issue.message);
            }
            Err(DomainError::SchemaValidation { issues }.into())
        }
        Err(other) => Err(other.into()),
    }
}
