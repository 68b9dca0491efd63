//! Incremental token cursor over a backup document.
//!
//! Wraps the async quick-xml reader and hands out owned tokens, so callers can
//! hold on to element names and text across further reads. Comments,
//! processing instructions, declarations and DOCTYPEs never reach the caller.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::io::AsyncBufRead;

use super::RestoreError;

/// Start tag with its attributes decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartTag {
    pub name: String,
    attributes: Vec<(String, String)>,
}

impl StartTag {
    fn from_event(event: &BytesStart<'_>) -> Result<Self, RestoreError> {
        let name = local_name(event.local_name().as_ref());
        let mut attributes = Vec::new();
        for attr in event.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = local_name(attr.key.local_name().as_ref());
            let value = attr.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self { name, attributes })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The `id` attribute, if present and not blank
    pub fn id(&self) -> Option<String> {
        self.attr("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Start(StartTag),
    End(String),
    Text(String),
    Eof,
}

pub(crate) struct XmlCursor<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

impl<R: AsyncBufRead + Unpin + Send> XmlCursor<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;
        config.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next structural token or non-empty run of character data
    pub async fn next(&mut self) -> Result<Token, RestoreError> {
        loop {
            self.buf.clear();
            let token = match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(e) => Token::Start(StartTag::from_event(&e)?),
                Event::End(e) => Token::End(local_name(e.local_name().as_ref())),
                Event::Text(e) => {
                    let text = e.unescape()?;
                    if text.is_empty() {
                        continue;
                    }
                    Token::Text(text.into_owned())
                }
                Event::CData(e) => Token::Text(String::from_utf8_lossy(&e.into_inner()).into_owned()),
                Event::Eof => Token::Eof,
                _ => continue,
            };
            return Ok(token);
        }
    }

    /// Consume the rest of the element `name` whose start tag was just read.
    /// Only same-name nesting needs tracking, so a depth counter suffices.
    pub async fn skip_element(&mut self, name: &str) -> Result<(), RestoreError> {
        let mut depth = 1usize;
        loop {
            match self.next().await? {
                Token::Start(tag) if tag.name == name => depth += 1,
                Token::End(end) if end == name => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Token::Eof => return Err(RestoreError::UnexpectedEof),
                _ => {}
            }
        }
    }

    /// Character data of the element `name` up to its end tag. Nested
    /// elements are skipped.
    pub async fn read_text(&mut self, name: &str) -> Result<String, RestoreError> {
        let mut text = String::new();
        loop {
            match self.next().await? {
                Token::Text(chunk) => text.push_str(&chunk),
                Token::Start(tag) => self.skip_element(&tag.name).await?,
                Token::End(end) if end == name => return Ok(text),
                Token::End(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }
    }

    /// Text of every child element of `name`, e.g. `<tags><tag>a</tag></tags>`
    pub async fn read_list(&mut self, name: &str) -> Result<Vec<String>, RestoreError> {
        let mut items = Vec::new();
        loop {
            match self.next().await? {
                Token::Start(tag) => {
                    let item = self.read_text(&tag.name).await?;
                    if !item.trim().is_empty() {
                        items.push(item.trim().to_string());
                    }
                }
                Token::End(end) if end == name => return Ok(items),
                Token::End(_) | Token::Text(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }
    }

    /// Next `item` start tag inside `section`, or `None` once the section closes.
    /// Unknown children are skipped whole.
    pub async fn next_item(
        &mut self,
        section: &str,
        item: &str,
    ) -> Result<Option<StartTag>, RestoreError> {
        loop {
            match self.next().await? {
                Token::Start(tag) if tag.name == item => return Ok(Some(tag)),
                Token::Start(tag) => self.skip_element(&tag.name).await?,
                Token::End(end) if end == section => return Ok(None),
                Token::End(_) | Token::Text(_) => {}
                Token::Eof => return Err(RestoreError::UnexpectedEof),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(xml: &str) -> XmlCursor<&[u8]> {
        XmlCursor::new(xml.as_bytes())
    }

    #[tokio::test]
    async fn test_ignores_prolog_and_comments() {
        let mut c = cursor(
            r#"<?xml version="1.0"?><!DOCTYPE inventory><!-- exported --><inventory a="1"/>"#,
        );
        match c.next().await.unwrap() {
            Token::Start(tag) => {
                assert_eq!(tag.name, "inventory");
                assert_eq!(tag.attr("a"), Some("1"));
            }
            other => panic!("Expected start tag, got {:?}", other),
        }
        assert_eq!(c.next().await.unwrap(), Token::End("inventory".to_string()));
        assert_eq!(c.next().await.unwrap(), Token::Eof);
    }

    #[tokio::test]
    async fn test_skip_element_tracks_same_name_nesting() {
        let mut c = cursor("<images><images><file/></images><x>t</x></images><after/>");
        c.next().await.unwrap();
        c.skip_element("images").await.unwrap();
        match c.next().await.unwrap() {
            Token::Start(tag) => assert_eq!(tag.name, "after"),
            other => panic!("Expected <after>, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_text_unescapes_and_joins_cdata() {
        let mut c = cursor("<name>Tom &amp; Jerry<![CDATA[ <3]]></name>");
        c.next().await.unwrap();
        assert_eq!(c.read_text("name").await.unwrap(), "Tom & Jerry <3");
    }

    #[tokio::test]
    async fn test_read_list() {
        let mut c = cursor("<tags><tag>office</tag><tag> </tag><tag>desk</tag></tags>");
        c.next().await.unwrap();
        assert_eq!(c.read_list("tags").await.unwrap(), vec!["office", "desk"]);
    }

    #[tokio::test]
    async fn test_next_item_skips_unknown_children() {
        let mut c = cursor(
            r#"<locations><note>x</note><location id=" 7 "/><location/></locations>"#,
        );
        c.next().await.unwrap();
        let first = c.next_item("locations", "location").await.unwrap().unwrap();
        assert_eq!(first.id().as_deref(), Some("7"));
        c.skip_element("location").await.unwrap();
        let second = c.next_item("locations", "location").await.unwrap().unwrap();
        assert_eq!(second.id(), None);
        c.skip_element("location").await.unwrap();
        assert!(c.next_item("locations", "location").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mismatched_end_tag_is_an_error() {
        let mut c = cursor("<a><b></a>");
        c.next().await.unwrap();
        c.next().await.unwrap();
        assert!(matches!(c.next().await, Err(RestoreError::Xml(_))));
    }

    #[tokio::test]
    async fn test_truncated_document_reports_eof() {
        let mut c = cursor("<images><file>");
        c.next().await.unwrap();
        assert!(matches!(
            c.skip_element("images").await,
            Err(RestoreError::UnexpectedEof)
        ));
    }
}
