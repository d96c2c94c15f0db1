//! Structured edits to the compose manifest under `deploy/`.

use camino::{Utf8Path, Utf8PathBuf};
use serde_yaml::{Mapping, Value};

use super::PackageError;

/// Manifest names probed in order inside `deploy/`.
pub const MANIFEST_NAMES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Returns the first compose manifest present under `<source>/deploy`.
#[must_use]
pub fn locate(source: &Utf8Path) -> Option<Utf8PathBuf> {
    let deploy = source.join("deploy");
    MANIFEST_NAMES
        .iter()
        .map(|name| deploy.join(name))
        .find(|path| path.is_file())
}

/// Removes `service` from the manifest at `path`, including every
/// `depends_on` reference to it. Returns `true` when the file changed.
///
/// # Errors
///
/// Returns [`PackageError::Manifest`] when the file cannot be read, parsed,
/// or written back.
pub fn drop_service(path: &Utf8Path, service: &str) -> Result<bool, PackageError> {
    let manifest_error = |message: String| PackageError::Manifest {
        path: path.to_path_buf(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|err| manifest_error(err.to_string()))?;
    let mut document: Value =
        serde_yaml::from_str(&content).map_err(|err| manifest_error(err.to_string()))?;

    if !remove_service(&mut document, service) {
        return Ok(false);
    }

    let rendered =
        serde_yaml::to_string(&document).map_err(|err| manifest_error(err.to_string()))?;
    std::fs::write(path, rendered).map_err(|err| manifest_error(err.to_string()))?;
    Ok(true)
}

fn remove_service(document: &mut Value, service: &str) -> bool {
    let Some(services) = document
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
    else {
        return false;
    };

    if services.shift_remove(service).is_none() {
        return false;
    }

    for (_, definition) in services.iter_mut() {
        if let Some(fields) = definition.as_mapping_mut() {
            scrub_dependency(fields, service);
        }
    }
    true
}

fn scrub_dependency(definition: &mut Mapping, service: &str) {
    let Some(depends_on) = definition.get_mut("depends_on") else {
        return;
    };

    let now_empty = match depends_on {
        Value::Sequence(entries) => {
            entries.retain(|entry| entry.as_str() != Some(service));
            entries.is_empty()
        }
        Value::Mapping(entries) => {
            entries.shift_remove(service);
            entries.is_empty()
        }
        _ => false,
    };

    if now_empty {
        definition.shift_remove("depends_on");
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn parse(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).expect("valid yaml")
    }

    #[rstest]
    fn removes_service_and_list_dependencies() {
        let mut document = parse(
            "services:\n  frontend:\n    image: web\n  api:\n    image: api\n    depends_on:\n      - frontend\n      - db\n  db:\n    image: postgres\n",
        );

        assert!(remove_service(&mut document, "frontend"));

        assert!(document["services"].get("frontend").is_none());
        assert_eq!(
            document["services"]["api"]["depends_on"],
            parse("- db")
        );
    }

    #[rstest]
    fn removes_map_dependencies_and_empty_keys() {
        let mut document = parse(
            "services:\n  frontend:\n    image: web\n  proxy:\n    image: nginx\n    depends_on:\n      frontend:\n        condition: service_started\n",
        );

        assert!(remove_service(&mut document, "frontend"));

        assert!(document["services"]["proxy"].get("depends_on").is_none());
        assert_eq!(document["services"]["proxy"]["image"], Value::from("nginx"));
    }

    #[rstest]
    #[case::no_services("version: '3'\n")]
    #[case::absent_service("services:\n  api:\n    image: api\n")]
    fn leaves_document_without_service_untouched(#[case] yaml: &str) {
        let mut document = parse(yaml);
        let before = document.clone();

        assert!(!remove_service(&mut document, "frontend"));
        assert_eq!(document, before);
    }
}
