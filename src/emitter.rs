use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::error::{ImportError, Result};
use crate::note::Note;

/// Empty store block shipped in the template; replaced exactly once.
pub const SENTINEL: &str = "<script id=\"storeArea\" type=\"application/json\">\n[]\n</script>";

const STORE_OPEN: &str = "<script id=\"storeArea\" type=\"application/json\">";

/// Pretty JSON array of notes with `</script>` neutralised.
pub fn store_payload(notes: &[Note]) -> Result<String> {
    let json = serde_json::to_string_pretty(notes)?;
    Ok(json.replace("</script>", "<\\/script>"))
}

/// Splice the payload into the template. `None` when the sentinel is absent.
pub fn render(notes: &[Note], template: &str) -> Result<Option<String>> {
    if !template.contains(SENTINEL) {
        return Ok(None);
    }
    let store = format!("{}\n{}\n</script>", STORE_OPEN, store_payload(notes)?);
    Ok(Some(template.replacen(SENTINEL, &store, 1)))
}

/// Read the template, write the finished document to `output`. On a missing
/// sentinel the output file receives a readable error message instead.
pub fn write_html(notes: &[Note], template_path: &Path, output: &Path) -> Result<()> {
    let template =
        fs::read_to_string(template_path).map_err(|e| ImportError::file(template_path, e))?;
    match render(notes, &template)? {
        Some(html) => {
            write_whole(output, &html)?;
            info!("Wrote {} notes to {}", notes.len(), output.display());
            Ok(())
        }
        None => {
            let message = format!(
                "ОШИБКА: не удалось найти блок storeArea в шаблоне {}. Шаблон должен содержать блок:\n\n{}\n",
                template_path.display(),
                SENTINEL
            );
            write_whole(output, &message)?;
            error!("Template {} has no storeArea block", template_path.display());
            Err(ImportError::MissingSentinel(template_path.to_path_buf()))
        }
    }
}

/// Write to a sibling temp file and rename it over `path`.
fn write_whole(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    fs::write(&tmp, contents).map_err(|e| ImportError::file(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ImportError::file(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> String {
        format!("<html><head>\n{}\n</head><body>[]</body></html>", SENTINEL)
    }

    fn payload_of(html: &str) -> &str {
        let start = html.find(STORE_OPEN).unwrap() + STORE_OPEN.len();
        let end = start + html[start..].find("\n</script>").unwrap();
        &html[start..end]
    }

    #[test]
    fn replaces_sentinel_once_and_keeps_the_rest() {
        let notes = vec![Note::new("A", "a", ""), Note::new("B", "b", "x")];
        let tpl = template();
        let html = render(&notes, &tpl).unwrap().unwrap();

        assert!(html.starts_with("<html><head>\n"));
        assert!(html.ends_with("\n</head><body>[]</body></html>"));
        assert!(!html.contains(SENTINEL));

        let parsed: serde_json::Value = serde_json::from_str(payload_of(&html)).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1]["tags"], "x");
    }

    #[test]
    fn payload_is_two_space_pretty_json() {
        let payload = store_payload(&[Note::new("A", "a", "")]).unwrap();
        assert!(payload.starts_with("[\n  {\n    \"title\": \"A\""));
    }

    #[test]
    fn script_close_tag_is_escaped() {
        let notes = vec![Note::new("X", "</script>alert(1)", "")];
        let html = render(&notes, &template()).unwrap().unwrap();
        let payload = payload_of(&html);
        assert!(payload.contains("<\\/script>alert(1)"));
        assert!(!payload.contains("</script>"));
    }

    #[test]
    fn missing_sentinel_writes_error_message() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("template.html");
        let out = dir.path().join("out.html");
        fs::write(&tpl, "<html><script id=\"storeArea\">[]</script></html>").unwrap();

        let err = write_html(&[Note::new("A", "a", "")], &tpl, &out).unwrap_err();
        assert!(matches!(err, ImportError::MissingSentinel(_)));
        let written = fs::read_to_string(&out).unwrap();
        assert!(written.starts_with("ОШИБКА:"));
    }

    #[test]
    fn missing_template_names_the_template() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("absent.html");
        let out = dir.path().join("out.html");

        let err = write_html(&[], &tpl, &out).unwrap_err();
        assert!(matches!(err, ImportError::File { ref path, .. } if path == &tpl));
        assert!(err.to_string().contains("absent.html"));
        assert!(!out.exists());
    }

    #[test]
    fn writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("template.html");
        let out = dir.path().join("out.html");
        fs::write(&tpl, template()).unwrap();

        write_html(&[Note::new("A", "a", "")], &tpl, &out).unwrap();
        let written = fs::read_to_string(&out).unwrap();
        assert!(written.contains("\"title\": \"A\""));
        assert!(!dir.path().join("out.html.part").exists());
    }
}
