//! HTML rendering for listings and error pages.
//!
//! Pages are self-contained: inline CSS, no scripts. Every interpolated
//! value goes through `html_escape`.

use std::fmt::Write;

use axum::http::StatusCode;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use crate::listing::{DirectoryListing, FileInfo};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; background: #f6f7f9; color: #1d2330; }
header { background: #1d2330; color: #fff; padding: 0.8rem 1.2rem; }
header a { color: #9cc3ff; text-decoration: none; }
header .sep { color: #6b7487; margin: 0 0.3rem; }
main { padding: 1rem 1.2rem; }
table { border-collapse: collapse; width: 100%; background: #fff; }
th, td { text-align: left; padding: 0.45rem 0.6rem; border-bottom: 1px solid #e3e6eb; }
th { font-weight: 600; color: #4a5368; }
td.icon { width: 48px; }
td.icon img { width: 32px; height: 32px; object-fit: contain; }
td.icon img.thumb { width: 48px; height: 48px; object-fit: cover; border-radius: 3px; }
td.size, td.modified { white-space: nowrap; color: #4a5368; }
a { color: #1f5fbf; }
.empty { color: #6b7487; font-style: italic; }
"#;

/// Render a directory listing page.
pub fn render_listing(listing: &DirectoryListing) -> String {
    let title = format!("Index of {}", listing.path);
    let mut body = String::new();

    body.push_str("<header><nav>");
    for (i, crumb) in listing.breadcrumbs.iter().enumerate() {
        if i > 0 {
            body.push_str("<span class=\"sep\">/</span>");
        }
        let _ = write!(
            body,
            "<a href=\"{}\">{}</a>",
            attr(&crumb.link),
            text(&crumb.name)
        );
    }
    body.push_str("</nav></header>\n<main>\n");

    if listing.files.is_empty() {
        body.push_str("<p class=\"empty\">This folder is empty.</p>\n");
    } else {
        body.push_str(
            "<table>\n<thead><tr><th></th><th>Name</th><th>Size</th><th>Modified</th></tr></thead>\n<tbody>\n",
        );
        for file in &listing.files {
            render_row(&mut body, file);
        }
        body.push_str("</tbody>\n</table>\n");
    }
    body.push_str("</main>");

    page(&title, &body)
}

fn render_row(out: &mut String, file: &FileInfo) {
    let preview = match &file.thumbnail_link {
        Some(thumb) => format!(
            "<img class=\"thumb\" src=\"{}\" alt=\"\" loading=\"lazy\">",
            attr(thumb)
        ),
        None => format!("<img src=\"{}\" alt=\"\">", attr(file.icon)),
    };
    let suffix = if file.is_dir { "/" } else { "" };

    let _ = writeln!(
        out,
        "<tr><td class=\"icon\">{preview}</td><td><a href=\"{}\">{}{suffix}</a></td><td class=\"size\">{}</td><td class=\"modified\">{}</td></tr>",
        attr(&file.link),
        text(&file.name),
        text(file.size.as_deref().unwrap_or("")),
        text(&file.modified),
    );
}

/// Render an error page for `status`.
///
/// Only the status and a fixed message are shown; internal error details
/// stay in the logs.
pub fn render_error_page(status: StatusCode, message: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    let title = format!("{} {}", status.as_u16(), reason);
    let body = format!(
        "<header><nav><a href=\"/\">Home</a></nav></header>\n<main>\n<h1>{}</h1>\n<p>{}</p>\n</main>",
        text(&title),
        text(message)
    );
    page(&title, &body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n<title>{}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        text(title)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{breadcrumbs, FILE_ICON, FOLDER_ICON};

    fn file(name: &str, link: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            link: link.to_string(),
            thumbnail_link: None,
            is_image: false,
            is_dir: false,
            modified: "02 Jan 2006 15:04".to_string(),
            size: Some("5 B".to_string()),
            icon: FILE_ICON,
        }
    }

    #[test]
    fn test_render_listing() {
        let mut image = file("cat.jpg", "/pics/cat.jpg");
        image.is_image = true;
        image.thumbnail_link = Some("/thumbnail/pics/cat.jpg".to_string());

        let mut dir = file("sub", "/pics/sub");
        dir.is_dir = true;
        dir.size = None;
        dir.icon = FOLDER_ICON;

        let listing = DirectoryListing {
            path: "/pics".to_string(),
            files: vec![dir, image],
            breadcrumbs: breadcrumbs("/pics"),
        };
        let html = render_listing(&listing);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Index of /pics</title>"));
        assert!(html.contains("<a href=\"/\">Home</a>"));
        assert!(html.contains("<a href=\"/pics\">pics</a>"));
        assert!(html.contains("<a href=\"/pics/sub\">sub/</a>"));
        assert!(html.contains("src=\"/thumbnail/pics/cat.jpg\""));
        assert!(html.contains("src=\"/icons/folder.png\""));
        assert!(html.contains("02 Jan 2006 15:04"));
    }

    #[test]
    fn test_render_empty_listing() {
        let listing = DirectoryListing {
            path: "/".to_string(),
            files: Vec::new(),
            breadcrumbs: breadcrumbs("/"),
        };
        let html = render_listing(&listing);

        assert!(html.contains("This folder is empty."));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn test_render_escapes_names() {
        let listing = DirectoryListing {
            path: "/<b>".to_string(),
            files: vec![file("<script>alert(1)</script>", "/x\"onmouseover=\"y")],
            breadcrumbs: Vec::new(),
        };
        let html = render_listing(&listing);

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("x\"onmouseover"));
        assert!(html.contains("Index of /&lt;b&gt;"));
    }

    #[test]
    fn test_render_error_page() {
        let html = render_error_page(StatusCode::NOT_FOUND, "Nothing lives at <here>.");

        assert!(html.contains("<title>404 Not Found</title>"));
        assert!(html.contains("<h1>404 Not Found</h1>"));
        assert!(html.contains("Nothing lives at &lt;here&gt;."));
    }
}
