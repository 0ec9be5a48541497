use crate::traits::ChatModel;
use crate::{ChatMessage, LlmError};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::Mutex;

/// Writes a PDF with one Courier text line per page.
pub(crate) fn write_text_pdf(path: &Path, pages: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources = dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    };
    save_pages(doc, path, pages, "F1", resources)
}

/// Writes a one-page PDF whose text selects font `F9` while declaring no
/// resources at all.
pub(crate) fn write_undefined_font_pdf(
    path: &Path,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    save_pages(
        Document::with_version("1.5"),
        path,
        &[text],
        "F9",
        dictionary! {},
    )
}

fn save_pages(
    mut doc: Document,
    path: &Path,
    pages: &[&str],
    font: &str,
    resources: Dictionary,
) -> Result<(), Box<dyn std::error::Error>> {
    let pages_id = doc.new_object_id();
    let resources_id = doc.add_object(resources);

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path)?;
    Ok(())
}

type Responder = Box<dyn Fn(usize, &[ChatMessage]) -> Result<String, LlmError> + Send + Sync>;

/// Chat model that answers from a closure and records every request.
pub(crate) struct ScriptedChatModel {
    responder: Responder,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatModel {
    pub(crate) fn with<F>(responder: F) -> Self
    where
        F: Fn(usize, &[ChatMessage]) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order; the last reply repeats once the script runs out.
    pub(crate) fn new(replies: &[&str]) -> Self {
        let replies = replies.iter().map(|reply| reply.to_string()).collect::<Vec<_>>();
        Self::with(move |call, _| {
            Ok(replies
                .get(call)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or_default())
        })
    }

    pub(crate) fn failing() -> Self {
        Self::with(|_, _| {
            Err(LlmError::Status {
                model: "scripted".to_string(),
                status: 500,
                details: "upstream unavailable".to_string(),
            })
        })
    }

    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            calls.len() - 1
        };
        (self.responder)(call, messages)
    }
}
