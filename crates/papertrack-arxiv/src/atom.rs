//! arXiv Atom feed parser using quick-xml

use chrono::{DateTime, Utc};
use papertrack_core::{Paper, StageError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

type XmlResult<T> = Result<T, quick_xml::Error>;

/// Raw fields of one `<entry>`, before validation
#[derive(Debug, Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    published: String,
    updated: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_link: Option<String>,
    comment: Option<String>,
    journal_ref: Option<String>,
}

/// Parse an arXiv query response into papers, in feed order.
///
/// Entries without a usable id or publication date are skipped. An arXiv
/// error entry (id under `/api/errors`) fails the whole feed.
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, StageError> {
    let entries = read_entries(xml).map_err(|e| StageError::malformed(format!("Atom parse error: {e}")))?;

    let mut papers = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.id.contains("/api/errors") {
            return Err(StageError::malformed(format!(
                "arXiv rejected query: {}",
                entry.summary
            )));
        }
        match into_paper(entry) {
            Ok(paper) => papers.push(paper),
            Err(reason) => log::debug!("Skipping feed entry: {reason}"),
        }
    }
    Ok(papers)
}

fn read_entries(xml: &str) -> XmlResult<Vec<Entry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"entry" => {
                entries.push(parse_entry(&mut reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

fn parse_entry(reader: &mut Reader<&[u8]>) -> XmlResult<Entry> {
    let mut entry = Entry::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"id" => entry.id = read_text(reader)?,
                b"title" => entry.title = read_text(reader)?,
                b"summary" => entry.summary = read_text(reader)?,
                b"published" => entry.published = read_text(reader)?,
                b"updated" => entry.updated = read_text(reader)?,
                b"author" => {
                    if let Some(name) = parse_author(reader)? {
                        entry.authors.push(name);
                    }
                }
                b"comment" => entry.comment = Some(read_text(reader)?),
                b"journal_ref" => entry.journal_ref = Some(read_text(reader)?),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"link" if attr(&e, b"title").as_deref() == Some("pdf") => {
                    entry.pdf_link = attr(&e, b"href");
                }
                b"category" => {
                    if let Some(term) = attr(&e, b"term") {
                        if !entry.categories.contains(&term) {
                            entry.categories.push(term);
                        }
                    }
                }
                _ => {}
            },
            Event::End(e) if e.local_name().as_ref() == b"entry" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entry)
}

fn parse_author(reader: &mut Reader<&[u8]>) -> XmlResult<Option<String>> {
    let mut name = None;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"name" => {
                name = Some(read_text(reader)?);
            }
            Event::End(e) if e.local_name().as_ref() == b"author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(name.map(|n| collapse_ws(&n)).filter(|n| !n.is_empty()))
}

/// Text content of the current element, nested markup flattened
fn read_text(reader: &mut Reader<&[u8]>) -> XmlResult<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(_) => break,
            Event::Start(_) => text.push_str(&read_text(reader)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// `http://arxiv.org/abs/2401.12345v2` -> `2401.12345v2`; old-style ids keep their slash
fn short_id(entry_id: &str) -> Option<String> {
    let id = entry_id.trim();
    let short = match id.find("/abs/") {
        Some(i) => &id[i + "/abs/".len()..],
        None => id.rsplit('/').next().unwrap_or(id),
    };
    (!short.is_empty()).then(|| short.to_string())
}

fn into_paper(entry: Entry) -> Result<Paper, String> {
    let id = short_id(&entry.id).ok_or_else(|| format!("missing id in {:?}", entry.id))?;
    let published = parse_time(&entry.published)
        .ok_or_else(|| format!("{id}: bad published date {:?}", entry.published))?;
    let updated = parse_time(&entry.updated).unwrap_or(published);
    let locator = entry
        .pdf_link
        .unwrap_or_else(|| entry.id.trim().replacen("/abs/", "/pdf/", 1));

    Ok(Paper {
        id,
        title: collapse_ws(&entry.title),
        authors: entry.authors,
        published,
        updated,
        summary: collapse_ws(&entry.summary),
        categories: entry.categories,
        locator,
        comment: entry.comment.map(|c| collapse_ws(&c)),
        journal_ref: entry.journal_ref.map(|j| collapse_ws(&j)),
    })
}
