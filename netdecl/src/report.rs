use colored::Colorize;
use netdecl::error::Error;

/// `file:line:col: kind error: message`, with the kind highlighted.
pub fn render_error(err: &Error) -> String {
    let label = format!("{} error", err.kind()).red().bold();
    match (err.location(), err) {
        (Some(loc), _) => format!("{loc}: {label}: {}", err.message()),
        (None, Error::Io { path, .. }) => {
            format!("{}: {label}: {}", path.display(), err.message())
        }
        (None, _) => format!("{label}: {}", err.message()),
    }
}

/// Wrap an engine failure for the binary's error path.
pub fn engine_error(err: Error) -> anyhow::Error {
    anyhow::anyhow!(render_error(&err))
}

pub fn render_ok(message: &str) -> String {
    format!("{} {message}", "ok:".green().bold())
}

pub fn render_written(path: &std::path::Path) -> String {
    format!("{} {}", "wrote".cyan(), path.display())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use netdecl::error::{Error, Location};

    use super::render_error;

    #[test]
    fn error_line_has_position_and_kind() {
        colored::control::set_override(false);
        let err = Error::schema(
            "unknown key 'mtux'",
            Location {
                file: Some(Path::new("etc/netdecl/a.yaml").to_path_buf()),
                line: 4,
                column: 7,
            },
        );
        assert_eq!(
            render_error(&err),
            "etc/netdecl/a.yaml:4:7: schema error: unknown key 'mtux'"
        );
        assert_eq!(
            render_error(&Error::semantic("br0: bad", None)),
            "semantic error: br0: bad"
        );
    }
}
