use crate::documents::Document;
use crate::error::{ChatError, ExtractionError};

/// Text pulled out of one stored document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub document_id: String,
    pub filename: String,
    pub text: String,
}

/// Extract the text of every page, in page order.
///
/// A page that fails to decode fails the whole document. Pages without text
/// contribute nothing, so a PDF of blank pages yields an empty string.
pub fn extract_text(pdf_bytes: &[u8], filename: &str) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(pdf_bytes).map_err(|e| ExtractionError::Parse {
        filename: filename.to_string(),
        message: e.to_string(),
    })?;

    let mut pages: Vec<u32> = doc.get_pages().keys().cloned().collect();
    pages.sort(); // Ensure pages are in order

    let mut full_text = String::new();
    for page_num in &pages {
        let page_text = doc
            .extract_text(&[*page_num])
            .map_err(|e| ExtractionError::Page {
                filename: filename.to_string(),
                page: *page_num,
                message: e.to_string(),
            })?;
        full_text.push_str(&page_text);
        // Add a newline between pages if the page doesn't end with one
        if !page_text.ends_with('\n') && !page_text.is_empty() {
            full_text.push('\n');
        }
    }

    tracing::debug!(
        "Extracted {} chars from {} pages of '{}'",
        full_text.len(),
        pages.len(),
        filename
    );

    Ok(full_text)
}

/// Read a stored document and extract its text on the blocking pool
pub async fn extract_document(document: &Document) -> Result<ExtractedText, ChatError> {
    let bytes = document.read().await?;
    let filename = document.filename.clone();

    let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &filename))
        .await
        .map_err(|e| ExtractionError::Join(e.to_string()))??;

    Ok(ExtractedText {
        document_id: document.id.clone(),
        filename: document.filename.clone(),
        text,
    })
}

/// Minimal PDFs for tests
#[cfg(test)]
pub(crate) mod test_pdf {
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a PDF with one page per entry. An empty entry produces a page with an
    /// empty content stream.
    pub fn build(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut page_ids = Vec::new();
        for text in page_texts {
            let content = if text.is_empty() {
                Vec::new()
            } else {
                format!(
                    "BT /F1 12 Tf 100 700 Td ({}) Tj ET",
                    text.replace('\\', "\\\\")
                        .replace('(', "\\(")
                        .replace(')', "\\)")
                )
                .into_bytes()
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(page_texts.len() as i64),
        });

        for page_id in &page_ids {
            if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", pages_id);
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}
