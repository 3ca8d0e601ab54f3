use std::io::Read;

use shipwright::spec::ModuleSpec;
use shipwright::Error;

pub mod plan;
pub mod run;
pub mod version;

/// Command results carry their own exit code alongside the payload.
pub type CmdResult<T> = shipwright::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Read a spec argument: `-` for stdin, inline JSON when it starts with
/// `{`, otherwise a file path.
pub fn load_spec(input: &str) -> shipwright::Result<ModuleSpec> {
    let trimmed = input.trim();

    let content = if trimmed == "-" {
        use std::io::IsTerminal;
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(Error::validation_invalid_argument(
                "spec",
                "Refusing to read the spec from an interactive terminal",
                None,
                Some(vec!["Pipe the spec: cat spec.json | shipwright run -".to_string()]),
            ));
        }
        let mut buffer = String::new();
        stdin.read_to_string(&mut buffer).map_err(|e| {
            Error::internal_io(e.to_string(), Some("read spec from stdin".to_string()))
        })?;
        buffer
    } else if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        let path = std::path::Path::new(trimmed);
        shipwright::utils::io::read_file(path, "read spec file").map_err(|e| {
            Error::validation_invalid_argument(
                "spec",
                format!("Cannot read spec '{}': {}", trimmed, e.message),
                None,
                Some(vec![
                    "Pass a spec file path, inline JSON, or '-' for stdin".to_string(),
                ]),
            )
        })?
    };

    ModuleSpec::from_json(&content)
}
