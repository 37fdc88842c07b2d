use hyperion_io::ModelStore;
use serde::Deserialize;

use crate::PdfError;

#[derive(Deserialize)]
struct Header {
    class_name: String,
    name: String,
}

/// Finds the first model in `store` whose class is one of `classes`.
/// Returns `(name, class_name)`.
pub(crate) fn find_model(store: &ModelStore, classes: &[&str]) -> Result<(String, String), PdfError> {
    for key in store.keys_with_prefix("") {
        let Some(prefix) = key.strip_suffix("/config") else {
            continue;
        };
        let Ok(header) = store.get_config::<Header>(key) else {
            continue;
        };
        if header.name == prefix && classes.contains(&header.class_name.as_str()) {
            return Ok((header.name, header.class_name));
        }
    }
    Err(PdfError::ModelNotFound(classes.join("|")))
}

pub(crate) fn config_key(name: &str) -> String {
    ModelStore::key(name, "config")
}
