//! Text extraction from uploaded document bytes.
//!
//! PDFs are detected by magic number and extracted with `pdf-extract`; anything
//! else is treated as UTF-8 text. A document that yields no usable text (a
//! scanned PDF, an empty file, a failed parse) produces `None` rather than an
//! error: unreadable input is a valid zero-chunk outcome for the ingestion
//! pipeline, not a failure.

const PDF_MAGIC: &[u8] = b"%PDF";

/// Extract plain text from raw document bytes.
///
/// Returns `None` when no usable text can be recovered. Extraction failures are
/// logged at warn level with the document source for diagnosis.
pub fn extract_text(bytes: &[u8], source: &str) -> Option<String> {
    let text = if bytes.starts_with(PDF_MAGIC) {
        match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(source, error = %error, "PDF text extraction failed");
                return None;
            }
        }
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    if text.trim().is_empty() {
        tracing::warn!(source, "No extractable text; document may be scanned or empty");
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let text = extract_text(b"Hello world. Second sentence.", "note.txt");
        assert_eq!(text.as_deref(), Some("Hello world. Second sentence."));
    }

    #[test]
    fn empty_bytes_yield_none() {
        assert!(extract_text(b"", "empty.txt").is_none());
        assert!(extract_text(b"   \n\t ", "blank.txt").is_none());
    }

    #[test]
    fn malformed_pdf_yields_none() {
        assert!(extract_text(b"%PDF-1.7 garbage that is not a pdf", "broken.pdf").is_none());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let bytes = [b'o', b'k', 0xff, 0xfe, b'!'];
        let text = extract_text(&bytes, "binary.bin").expect("lossy text");
        assert!(text.starts_with("ok"));
    }
}
