//! Streaming of inline base64 attachment payloads into the blob store
//!
//! Attachments appear inside their commodity element, before the commodity
//! itself is committed. Each one is decoded straight into a blob writer while
//! its `<file>` element is read, then held as a [`PendingFile`] until the
//! commodity has a storage ID to link it to.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use stockroom_core::types::{Attachment, AttachmentKind, EntityKind, RestoreStrategy, Scope};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use super::reader::{StartTag, Token, XmlCursor};
use super::reconcile::{Outcome, Restorer};
use super::RestoreError;
use crate::blob::BlobWriter;

/// Base64 characters decoded per block. A multiple of four.
const DECODE_BLOCK: usize = 64 * 1024;

/// Longest slug kept from the original file name
const MAX_SLUG_LEN: usize = 64;

/// Digest bytes rendered into a blob name
const KEY_DIGEST_BYTES: usize = 8;

/// Incremental base64 decoder writing into an async sink
pub(crate) struct Base64Stream {
    carry: Vec<u8>,
    scratch: Vec<u8>,
}

impl Base64Stream {
    pub fn new() -> Self {
        Self {
            carry: Vec::with_capacity(DECODE_BLOCK),
            scratch: Vec::new(),
        }
    }

    /// Decode `chunk`, writing every complete block to `out`. Whitespace is
    /// ignored. Returns the number of bytes written.
    pub async fn feed<W>(&mut self, chunk: &str, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut written = 0;
        for byte in chunk.bytes().filter(|b| !b.is_ascii_whitespace()) {
            self.carry.push(byte);
            if self.carry.len() == DECODE_BLOCK {
                written += self.decode_carry(out).await?;
            }
        }
        Ok(written)
    }

    /// Decode whatever is left. Fails on a truncated final quantum.
    pub async fn finish<W>(mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.carry.is_empty() {
            return Ok(0);
        }
        if self.carry.len() % 4 != 0 {
            bail!(
                "truncated base64 data ({} trailing characters)",
                self.carry.len() % 4
            );
        }
        self.decode_carry(out).await
    }

    async fn decode_carry<W>(&mut self, out: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.scratch.clear();
        STANDARD
            .decode_vec(&self.carry, &mut self.scratch)
            .context("invalid base64 data")?;
        out.write_all(&self.scratch)
            .await
            .context("failed to write attachment data")?;
        self.carry.clear();
        Ok(self.scratch.len() as u64)
    }
}

fn slugify(stem: &str) -> String {
    let mut slug = String::new();
    for c in stem.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "file".to_string()
    } else {
        slug.to_string()
    }
}

/// Blob name for an attachment: a slug of the original file name, a digest
/// of the owning scope, original path, document ID and `nonce`, then the
/// extension. Every write uses a fresh nonce, so it never lands on a key a
/// stored attachment points at.
pub(crate) fn stored_file_name(
    original_path: &str,
    ext_hint: &str,
    scope: &Scope,
    doc_id: &str,
    nonce: &str,
) -> String {
    let file_name = original_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_path);
    let (stem, file_ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, ""),
    };

    let ext_hint = ext_hint.trim().trim_start_matches('.');
    let ext: String = if ext_hint.is_empty() { file_ext } else { ext_hint }
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let mut hasher = Sha256::new();
    for part in [
        scope.tenant_id.as_str(),
        scope.user_id.as_str(),
        original_path,
        doc_id,
        nonce,
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0]);
    }
    let digest = hasher.finalize();
    let hash: String = digest[..KEY_DIGEST_BYTES].iter().map(|b| format!("{:02x}", b)).collect();

    let slug = slugify(stem);
    if ext.is_empty() {
        format!("{}-{}", slug, hash)
    } else {
        format!("{}-{}.{}", slug, hash, ext)
    }
}

/// Decoded attachment waiting for its commodity
#[derive(Debug)]
pub(crate) struct PendingFile {
    pub doc_id: String,
    pub attachment: Attachment,
    pub bytes: u64,
}

impl PendingFile {
    fn blob_key(&self) -> &str {
        &self.attachment.file.path
    }
}

/// Header fields of a `<file>` element
#[derive(Debug, Default)]
struct FileHeader {
    path: String,
    original_path: String,
    extension: String,
    mime_type: String,
}

impl<'a> Restorer<'a> {
    /// Read every `<file>` of the attachment section `kind`
    pub async fn read_attachments<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        kind: AttachmentKind,
        pending: &mut Vec<PendingFile>,
    ) -> Result<(), RestoreError> {
        while let Some(tag) = cursor.next_item(kind.section(), "file").await? {
            if let Some(file) = self.read_attachment(cursor, kind, &tag).await? {
                pending.push(file);
            }
        }
        Ok(())
    }

    /// Stream one `<file>` element. Only malformed XML is returned as an
    /// error; anything else is recorded against the attachment.
    async fn read_attachment<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        kind: AttachmentKind,
        tag: &StartTag,
    ) -> Result<Option<PendingFile>, RestoreError> {
        let entity_kind = kind.entity_kind();
        let Some(doc_id) = tag.id() else {
            cursor.skip_element(&tag.name).await?;
            self.entity_failed(
                entity_kind,
                "<no id>",
                anyhow::anyhow!("file element is missing its id attribute"),
            );
            return Ok(None);
        };

        if let Err(err) = self.state.mark_seen(entity_kind, &doc_id) {
            cursor.skip_element(&tag.name).await?;
            self.entity_failed(entity_kind, &doc_id, err);
            return Ok(None);
        }

        // Merge add never touches an existing attachment, so its payload is not needed
        if self.options.strategy == RestoreStrategy::MergeAdd
            && self.state.existing.contains(entity_kind, &doc_id)
        {
            cursor.skip_element(&tag.name).await?;
            debug!("Skipped existing {} {} without reading its data", kind, doc_id);
            self.state.stats.record_skipped();
            return Ok(None);
        }

        let mut header = FileHeader::default();
        let mut streamed: Option<Result<(String, u64)>> = None;
        loop {
            match cursor.next().await? {
                Token::Start(child) => match child.name.as_str() {
                    "path" => header.path = cursor.read_text("path").await?.trim().to_string(),
                    "originalPath" => {
                        header.original_path =
                            cursor.read_text("originalPath").await?.trim().to_string()
                    }
                    "extension" => {
                        header.extension = cursor.read_text("extension").await?.trim().to_string()
                    }
                    "mimeType" => {
                        header.mime_type = cursor.read_text("mimeType").await?.trim().to_string()
                    }
                    "data" if streamed.is_none() => {
                        streamed = Some(self.stream_data(cursor, &header, &doc_id).await?);
                    }
                    other => cursor.skip_element(other).await?,
                },
                Token::End(end) if end == tag.name => break,
                Token::End(_) | Token::Text(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }

        let (key, bytes) = match streamed {
            Some(Ok(done)) => done,
            Some(Err(err)) => {
                self.entity_failed(entity_kind, &doc_id, err);
                return Ok(None);
            }
            None => {
                self.entity_failed(
                    entity_kind,
                    &doc_id,
                    anyhow::anyhow!("file element has no data"),
                );
                return Ok(None);
            }
        };

        self.state.stats.add_binary_data(bytes);
        let mut attachment = Attachment::new(kind);
        attachment.id = doc_id.clone();
        attachment.file.path = key.clone();
        attachment.file.original_path = key;
        attachment.file.ext = header.extension;
        attachment.file.mime_type = header.mime_type;

        Ok(Some(PendingFile {
            doc_id,
            attachment,
            bytes,
        }))
    }

    /// Decode the `<data>` element into a new blob. The element is always
    /// consumed in full, even when decoding or writing fails part way.
    async fn stream_data<R: AsyncBufRead + Unpin + Send>(
        &mut self,
        cursor: &mut XmlCursor<R>,
        header: &FileHeader,
        doc_id: &str,
    ) -> Result<Result<(String, u64)>, RestoreError> {
        let source = if header.original_path.is_empty() {
            &header.path
        } else {
            &header.original_path
        };
        let nonce = Uuid::new_v4().simple().to_string();
        let key = stored_file_name(source, &header.extension, self.scope, doc_id, &nonce);

        let mut writer: BlobWriter = if self.options.dry_run {
            Box::pin(tokio::io::sink())
        } else {
            match self.blobs.writer(&key).await {
                Ok(writer) => writer,
                Err(err) => {
                    cursor.skip_element("data").await?;
                    return Ok(Err(anyhow::Error::new(err)
                        .context(format!("failed to open blob {}", key))));
                }
            }
        };

        let mut decoder = Base64Stream::new();
        let mut bytes = 0u64;
        let mut failure: Option<anyhow::Error> = None;
        loop {
            match cursor.next().await? {
                Token::Text(chunk) => {
                    if failure.is_none() {
                        match decoder.feed(&chunk, &mut writer).await {
                            Ok(n) => bytes += n,
                            Err(err) => failure = Some(err),
                        }
                    }
                }
                Token::Start(tag) => cursor.skip_element(&tag.name).await?,
                Token::End(end) if end == "data" => break,
                Token::End(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }

        let result = match failure {
            Some(err) => Err(err),
            None => match decoder.finish(&mut writer).await {
                Ok(n) => {
                    bytes += n;
                    writer
                        .shutdown()
                        .await
                        .context("failed to flush attachment data")
                        .map(|()| bytes)
                }
                Err(err) => Err(err),
            },
        };

        match result {
            Ok(bytes) => {
                debug!("Streamed {} bytes into blob {}", bytes, key);
                Ok(Ok((key, bytes)))
            }
            Err(err) => {
                drop(writer);
                self.discard_blob(&key).await;
                Ok(Err(err.context(format!("failed to store attachment {}", key))))
            }
        }
    }

    /// Best-effort removal of a blob. Only keys written by this run, or the
    /// replaced blob of an attachment this run has just updated, are passed here.
    async fn discard_blob(&self, key: &str) {
        if self.options.dry_run {
            return;
        }
        if let Err(err) = self.blobs.delete(key).await {
            debug!("Could not remove blob {}: {}", key, err);
        }
    }

    /// Link buffered attachments to their commodity, now that it has been
    /// resolved. Without a resolved commodity the blobs stay unlinked.
    pub async fn flush_attachments(&mut self, commodity_doc_id: Option<&str>, pending: Vec<PendingFile>) {
        let commodity_id = commodity_doc_id
            .filter(|doc_id| self.state.existing.contains(EntityKind::Commodity, doc_id))
            .and_then(|doc_id| self.state.ids.get(EntityKind::Commodity, doc_id))
            .map(str::to_string);

        let registries = self.registries;
        for mut file in pending {
            let kind = file.attachment.kind;
            let Some(commodity_id) = &commodity_id else {
                warn!(
                    "Orphaned {} {}: blob {} ({} bytes) is not linked to any commodity",
                    kind,
                    file.doc_id,
                    file.blob_key(),
                    file.bytes
                );
                self.state.stats.record_skipped();
                continue;
            };

            file.attachment.commodity_id = commodity_id.clone();
            let previous_blob = self
                .state
                .existing
                .attachment(kind, &file.doc_id)
                .map(|a| a.file.path.clone());
            let new_blob = file.blob_key().to_string();

            let registry = registries.attachments(kind);
            match self
                .reconcile(registry.as_ref(), &file.doc_id, file.attachment)
                .await
            {
                // The record now points at the new blob
                Ok(Outcome::Updated) => {
                    if let Some(old) = previous_blob.filter(|old| *old != new_blob) {
                        self.discard_blob(&old).await;
                    }
                }
                Ok(_) => {}
                // The stored record, if any, still points at its old blob
                Err(err) => {
                    self.discard_blob(&new_blob).await;
                    self.entity_failed(kind.entity_kind(), &file.doc_id, err);
                }
            }
        }
    }
}
