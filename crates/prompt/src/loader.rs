//! Workspace prompt overrides.
//!
//! An override lives at `.ragline/prompts/<id>.yml` and replaces the built-in
//! definition with the same id.

use crate::defaults::{answer_system_prompt, ANSWER_SYSTEM_PROMPT_ID};
use crate::types::PromptDefinition;
use ragline_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Placeholder every answer template must contain.
const INPUT_PLACEHOLDER: &str = "{{input}}";

/// Location of the override file for `prompt_id`.
pub fn prompt_path(workspace_path: &Path, prompt_id: &str) -> PathBuf {
    workspace_path
        .join(".ragline/prompts")
        .join(format!("{}.yml", prompt_id))
}

/// Load and validate the override for `prompt_id`.
///
/// # Example
/// ```no_run
/// use ragline_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "answer.system")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let path = prompt_path(workspace_path, prompt_id);
    tracing::debug!("Loading prompt override from {:?}", path);

    let contents = std::fs::read_to_string(&path).map_err(|e| {
        AppError::Prompt(format!("Cannot read prompt {} at {:?}: {}", prompt_id, path, e))
    })?;
    let definition: PromptDefinition = serde_yaml::from_str(&contents)
        .map_err(|e| AppError::Prompt(format!("Invalid prompt YAML {:?}: {}", path, e)))?;

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt file {:?} declares id '{}', expected '{}'",
            path, definition.id, prompt_id
        )));
    }
    validate_prompt(&definition)?;

    tracing::info!("Using prompt override {} ({})", definition.id, definition.title);
    Ok(definition)
}

/// Load a workspace override, falling back to the built-in definition.
///
/// Only `answer.system` has a built-in definition; other ids must exist on disk.
pub fn load_prompt_or_default(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<PromptDefinition> {
    if prompt_id == ANSWER_SYSTEM_PROMPT_ID && !prompt_path(workspace_path, prompt_id).is_file() {
        tracing::debug!("No override for {}, using built-in prompt", prompt_id);
        return Ok(answer_system_prompt());
    }
    load_prompt(workspace_path, prompt_id)
}

fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    let missing = [
        ("title", def.title.trim().is_empty()),
        ("apiVersion", def.api_version.trim().is_empty()),
        ("template", def.template.trim().is_empty()),
    ]
    .into_iter()
    .find(|(_, empty)| *empty);
    if let Some((field, _)) = missing {
        return Err(AppError::Prompt(format!(
            "Prompt {} has an empty {}",
            def.id, field
        )));
    }

    if !def.template.contains(INPUT_PLACEHOLDER) {
        return Err(AppError::Prompt(format!(
            "Prompt {} must reference {}",
            def.id, INPUT_PLACEHOLDER
        )));
    }

    // "major.minor"
    let mut parts = def.api_version.split('.');
    let well_formed = matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(major), Some(minor), None)
            if !major.is_empty() && !minor.is_empty()
                && major.chars().chain(minor.chars()).all(|c| c.is_ascii_digit())
    );
    if !well_formed {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion '{}' in prompt {}, expected 'major.minor'",
            def.api_version, def.id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, body: &str) {
        let path = prompt_path(dir, id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn valid_body(id: &str) -> String {
        format!(
            "id: {}\ntitle: \"Analyst voice\"\napiVersion: \"1.0\"\ntemplate: \"Answer briefly. {{{{input}}}}\"\n",
            id
        )
    }

    #[test]
    fn test_override_replaces_builtin() {
        let temp = TempDir::new().unwrap();
        let prompt = load_prompt_or_default(temp.path(), ANSWER_SYSTEM_PROMPT_ID).unwrap();
        assert_eq!(prompt, answer_system_prompt());

        write_override(temp.path(), ANSWER_SYSTEM_PROMPT_ID, &valid_body(ANSWER_SYSTEM_PROMPT_ID));
        let prompt = load_prompt_or_default(temp.path(), ANSWER_SYSTEM_PROMPT_ID).unwrap();
        assert_eq!(prompt.title, "Analyst voice");
        assert!(prompt.template.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn test_missing_override_fails_for_other_ids() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            load_prompt_or_default(temp.path(), "other"),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        write_override(temp.path(), "broken", "invalid: yaml: content:");
        assert!(load_prompt(temp.path(), "broken").is_err());
    }

    #[test]
    fn test_id_must_match_file_name() {
        let temp = TempDir::new().unwrap();
        write_override(temp.path(), ANSWER_SYSTEM_PROMPT_ID, &valid_body("something.else"));
        assert!(load_prompt(temp.path(), ANSWER_SYSTEM_PROMPT_ID).is_err());
    }

    #[test]
    fn test_validation_rules() {
        let temp = TempDir::new().unwrap();
        let cases = [
            "id: p\ntitle: \"\"\napiVersion: \"1.0\"\ntemplate: \"{{input}}\"\n",
            "id: p\ntitle: T\napiVersion: \"1.0\"\ntemplate: \"no placeholder\"\n",
            "id: p\ntitle: T\napiVersion: \"v1\"\ntemplate: \"{{input}}\"\n",
            "id: p\ntitle: T\napiVersion: \"1.x\"\ntemplate: \"{{input}}\"\n",
        ];
        for body in cases {
            write_override(temp.path(), "p", body);
            assert!(load_prompt(temp.path(), "p").is_err(), "accepted: {}", body);
        }

        write_override(temp.path(), "p", &valid_body("p"));
        assert!(load_prompt(temp.path(), "p").is_ok());
    }
}
