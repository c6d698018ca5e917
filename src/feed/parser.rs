use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::util::{decode_html_entities, strip_control_chars};

/// A fetched RSS document, normalized and entity-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedContent {
    pub title: String,
    pub description: String,
    /// Items in document order
    pub items: Vec<FeedItem>,
}

/// One `<item>` of a channel.
///
/// `pub_date` is kept as the raw string from the document; interpreting it
/// is left to ingestion so an unparsable date never rejects the item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub pub_date: String,
}

/// Element names collected into [`Fields`]. Compared with the prefix
/// included, so extension elements such as `itunes:title` or `atom:link`
/// never match.
const FIELD_NAMES: [&[u8]; 4] = [b"title", b"description", b"link", b"pubDate"];

/// Text fields collected for a channel or an item. The first occurrence of
/// each element wins.
#[derive(Debug, Default)]
struct Fields {
    title: Option<String>,
    description: Option<String>,
    link: Option<String>,
    pub_date: Option<String>,
}

impl Fields {
    fn slot(&mut self, name: &[u8]) -> Option<&mut Option<String>> {
        match name {
            b"title" => Some(&mut self.title),
            b"description" => Some(&mut self.description),
            b"link" => Some(&mut self.link),
            b"pubDate" => Some(&mut self.pub_date),
            _ => None,
        }
    }
}

/// Element whose text is being collected
struct Capture {
    name: Vec<u8>,
    depth: usize,
    text: String,
}

/// Parse an RSS 2.0 document.
///
/// Expects `<channel>` directly under the root element and `<item>`s
/// directly under the channel. Text is XML-unescaped, then HTML entities
/// are decoded once more and terminal control sequences removed.
///
/// Fails without returning a partial feed when the bytes are not UTF-8, the
/// markup is malformed, or there is no `<channel>` element.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedContent> {
    let text = std::str::from_utf8(bytes).context("Feed body is not valid UTF-8")?;
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(text);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut channel: Option<Fields> = None;
    let mut channel_closed = false;
    let mut item: Option<Fields> = None;
    let mut items: Vec<Fields> = Vec::new();
    let mut capture: Option<Capture> = None;

    loop {
        match reader.read_event().context("Invalid RSS markup")? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                let depth = path.len();
                let in_channel = !channel_closed && depth >= 2 && path[1] == b"channel";

                if capture.is_none() {
                    if depth == 1 && name == b"channel" && channel.is_none() {
                        channel = Some(Fields::default());
                    } else if depth == 2 && in_channel && name == b"item" {
                        item = Some(Fields::default());
                    } else if ((depth == 2 && in_channel) || (depth == 3 && item.is_some()))
                        && FIELD_NAMES.contains(&name.as_slice())
                    {
                        capture = Some(Capture {
                            name: name.clone(),
                            depth,
                            text: String::new(),
                        });
                    }
                }
                path.push(name);
            }
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                let depth = path.len();

                if let Some(done) = capture.take_if(|c| c.depth == depth) {
                    let target = if depth == 3 { item.as_mut() } else { channel.as_mut() };
                    if let Some(slot) = target.and_then(|fields| fields.slot(&done.name)) {
                        slot.get_or_insert(done.text);
                    }
                } else if depth == 2 && name == b"item" {
                    items.extend(item.take());
                } else if depth == 1 && name == b"channel" && channel.is_some() {
                    channel_closed = true;
                }
            }
            Event::Text(e) => {
                if let Some(c) = capture.as_mut() {
                    let raw = e.into_inner();
                    let raw = std::str::from_utf8(&raw).context("Invalid RSS markup")?;
                    c.text.push_str(&decode_html_entities(raw));
                }
            }
            Event::CData(e) => {
                if let Some(c) = capture.as_mut() {
                    let raw = e.into_inner();
                    c.text
                        .push_str(std::str::from_utf8(&raw).context("Invalid RSS markup")?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = path.last() {
        bail!("Invalid RSS markup: unclosed <{}>", String::from_utf8_lossy(open));
    }
    let Some(channel) = channel else {
        bail!("Invalid RSS markup: no <channel> element");
    };

    Ok(FeedContent {
        title: clean(channel.title.as_deref()),
        description: clean(channel.description.as_deref()),
        items: items
            .into_iter()
            .map(|item| FeedItem {
                title: clean(item.title.as_deref()),
                description: clean(item.description.as_deref()),
                link: strip_control_chars(item.link.as_deref().unwrap_or_default().trim())
                    .into_owned(),
                pub_date: item.pub_date.as_deref().unwrap_or_default().trim().to_string(),
            })
            .collect(),
    })
}

fn clean(raw: Option<&str>) -> String {
    let decoded = decode_html_entities(raw.unwrap_or_default().trim());
    strip_control_chars(&decoded).trim().to_string()
}
