use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};
use std::ops::Range;

/// Renders a plain-text code frame pointing at `span` in `source_code`.
pub(crate) fn code_frame(
    filename: &str,
    source_code: &str,
    span: Range<usize>,
    message: &str,
    reason: &str,
) -> String {
    let mut report_bytes = Vec::new();
    let written = Report::build(ReportKind::Error, (filename, span.clone()))
        .with_config(
            Config::default()
                .with_color(false)
                .with_index_type(IndexType::Byte),
        )
        .with_message(message)
        .with_label(Label::new((filename, span)).with_message(reason))
        .finish()
        .write((filename, Source::from(source_code)), &mut report_bytes);
    if let Err(error) = written {
        log::warn!("Failed to render a code frame: {error}");
        return String::new();
    }
    String::from_utf8_lossy(&report_bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_points_at_span() {
        let frame = code_frame("cell", "1 + * 2", 4..5, "unexpected '*'", "here");
        assert!(frame.contains("unexpected '*'"));
        assert!(frame.contains("1 + * 2"));
        assert!(frame.contains("here"));
    }
}
