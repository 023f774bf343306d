//! In-memory backend for pipeline tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::backend::{DocumentCursor, QuerySpec, RawDocument, ScrollRequest, SearchBackend};
use crate::error::{ExportError, Result};

/// One scripted response from `next_page`
#[derive(Debug, Clone)]
pub(crate) enum Page {
    Docs(Vec<RawDocument>),
    Fail(String),
}

impl Page {
    pub(crate) fn docs(raw: &[&str]) -> Self {
        Page::Docs(raw.iter().map(|doc| RawDocument::new(*doc)).collect())
    }

    pub(crate) fn fail(message: &str) -> Self {
        Page::Fail(message.to_string())
    }
}

/// Backend that replays a fixed list of pages
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    pages: Vec<Page>,
    count_error: Option<String>,
    closed: Arc<AtomicBool>,
}

impl ScriptedBackend {
    pub(crate) fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            count_error: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn failing_count(mut self, message: &str) -> Self {
        self.count_error = Some(message.to_string());
        self
    }

    pub(crate) fn cursor_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn total(&self) -> u64 {
        self.pages
            .iter()
            .map(|page| match page {
                Page::Docs(docs) => docs.len() as u64,
                Page::Fail(_) => 0,
            })
            .sum()
    }
}

#[async_trait]
impl SearchBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn count(&self, _query: &QuerySpec, _index: &str) -> Result<u64> {
        match &self.count_error {
            Some(message) => Err(ExportError::Generic(message.clone())),
            None => Ok(self.total()),
        }
    }

    async fn open(&self, _request: &ScrollRequest) -> Result<Box<dyn DocumentCursor>> {
        Ok(Box::new(ScriptedCursor {
            pages: self.pages.iter().cloned().collect(),
            closed: Arc::clone(&self.closed),
        }))
    }
}

struct ScriptedCursor {
    pages: VecDeque<Page>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DocumentCursor for ScriptedCursor {
    async fn next_page(&mut self) -> Result<Option<Vec<RawDocument>>> {
        match self.pages.pop_front() {
            Some(Page::Docs(docs)) => Ok(Some(docs)),
            Some(Page::Fail(message)) => {
                // a failed cursor stays failed
                self.pages.clear();
                Err(ExportError::Generic(message))
            }
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
