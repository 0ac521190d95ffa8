use karbon_core::config::LoadOptions;
use karbon_core::domain::activity::ActivityKind;
use serde_json::{json, Map, Value};

use crate::commands::{build_engine, load_config, CommandResult, EXIT_INVALID_INPUT};

pub fn run(kind: Option<&str>, load_options: LoadOptions) -> CommandResult {
    let kinds = match kind {
        Some(raw) => match raw.parse::<ActivityKind>() {
            Ok(kind) => vec![kind],
            Err(message) => {
                return CommandResult::failure(
                    "categories",
                    "invalid_input",
                    format!("Invalid `kind`: {message}"),
                    EXIT_INVALID_INPUT,
                )
            }
        },
        None => ActivityKind::ALL.to_vec(),
    };

    let config = match load_config("categories", load_options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let engine = match build_engine("categories", &config) {
        Ok(engine) => engine,
        Err(result) => return result,
    };
    let table = engine.table();

    let mut lines = vec![format!("factor table {} ({} entries)", table.version(), table.len())];
    let mut categories = Map::new();
    for kind in kinds {
        lines.push(format!("{kind}:"));
        let mut keys = Vec::new();
        for key in table.list_categories(Some(kind)) {
            if let Some(entry) = table.lookup(key) {
                lines.push(format!("  - {key} = {} {}", entry.factor_value, entry.unit.label()));
            }
            keys.push(Value::String(key.to_string()));
        }
        categories.insert(kind.as_str().to_string(), Value::Array(keys));
    }

    CommandResult::success_with_data(
        "categories",
        lines.join("\n"),
        Some(json!({
            "factor_version": table.version(),
            "fingerprint": table.fingerprint(),
            "categories": categories,
        })),
    )
}
