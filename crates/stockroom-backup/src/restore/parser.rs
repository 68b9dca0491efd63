//! Single-pass dispatch over the sections of a backup document

use stockroom_core::types::{AttachmentKind, EntityKind};
use tokio::io::AsyncBufRead;
use tracing::{debug, info};

use super::decode::RawRecord;
use super::reader::{StartTag, Token, XmlCursor};
use super::reconcile::Restorer;
use super::RestoreError;

/// Top-level sections, in the order the format writes them
const SECTIONS: &[&str] = &["locations", "areas", "commodities"];

impl<'a> Restorer<'a> {
    /// Walk the document once. The root element may have any name; only the
    /// known sections are accepted beneath it.
    pub async fn process_document<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
    ) -> Result<(), RestoreError> {
        let mut root: Option<String> = None;
        loop {
            match cursor.next().await? {
                Token::Start(tag) if SECTIONS.contains(&tag.name.as_str()) => {
                    self.process_section(cursor, &tag).await?;
                }
                Token::Start(tag) if root.is_none() => {
                    debug!("Entered document element <{}>", tag.name);
                    root = Some(tag.name);
                }
                Token::Start(tag) => return Err(RestoreError::UnexpectedElement(tag.name)),
                Token::End(end) if root.as_deref() == Some(end.as_str()) => return Ok(()),
                Token::End(end) => return Err(RestoreError::UnexpectedElement(end)),
                Token::Text(_) => {}
                Token::Eof if root.is_none() => return Ok(()),
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }
    }

    async fn process_section<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        tag: &StartTag,
    ) -> Result<(), RestoreError> {
        let section = tag.name.as_str();
        let step = format!("Process {}", section);
        info!("Processing {}", section);
        self.recorder.started(&step).await;

        let before = self.state.stats.clone();
        let result = match section {
            "locations" => self.process_locations(cursor).await,
            "areas" => self.process_areas(cursor).await,
            _ => self.process_commodities(cursor).await,
        };

        match result {
            Ok(()) => {
                let stats = &self.state.stats;
                let detail = format!(
                    "{} created, {} updated, {} skipped, {} errors",
                    stats.created_count - before.created_count,
                    stats.updated_count - before.updated_count,
                    stats.skipped_count - before.skipped_count,
                    stats.error_count - before.error_count,
                );
                self.recorder.succeeded(&step, &detail).await;
                Ok(())
            }
            Err(err) => {
                let err = RestoreError::section(section, err);
                self.recorder.failed(&step, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn process_locations<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
    ) -> Result<(), RestoreError> {
        while let Some(tag) = cursor.next_item("locations", "location").await? {
            let record = RawRecord::read(cursor, &tag).await?;
            if let Err(err) = self.restore_location(&record).await {
                self.entity_failed(EntityKind::Location, &record.label(), err);
            }
        }
        Ok(())
    }

    async fn process_areas<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
    ) -> Result<(), RestoreError> {
        while let Some(tag) = cursor.next_item("areas", "area").await? {
            let record = RawRecord::read(cursor, &tag).await?;
            if let Err(err) = self.restore_area(&record).await {
                self.entity_failed(EntityKind::Area, &record.label(), err);
            }
        }
        Ok(())
    }

    async fn process_commodities<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
    ) -> Result<(), RestoreError> {
        while let Some(tag) = cursor.next_item("commodities", "commodity").await? {
            self.process_commodity(cursor, &tag).await?;
        }
        Ok(())
    }

    /// Attachments are decoded while the commodity element is read, then
    /// linked once the commodity itself has been reconciled.
    async fn process_commodity<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        tag: &StartTag,
    ) -> Result<(), RestoreError> {
        let mut record = RawRecord::new(tag.id());
        let mut pending = Vec::new();
        loop {
            match cursor.next().await? {
                Token::Start(child) => match AttachmentKind::from_section(&child.name) {
                    Some(kind) if self.options.include_file_data => {
                        self.read_attachments(cursor, kind, &mut pending).await?;
                    }
                    Some(_) => cursor.skip_element(&child.name).await?,
                    None => record.read_child(cursor, &child.name).await?,
                },
                Token::End(end) if end == tag.name => break,
                Token::End(_) | Token::Text(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }

        let owner = match self.restore_commodity(&record).await {
            Ok(_) => record.id.as_deref(),
            Err(err) => {
                self.entity_failed(EntityKind::Commodity, &record.label(), err);
                None
            }
        };
        self.flush_attachments(owner, pending).await;
        Ok(())
    }
}
