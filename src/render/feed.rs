use anyhow::{Context, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::ingest::types::{Item, SourceInfo};

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

/// RFC 2822 date for a millisecond timestamp.
pub fn rfc2822_from_ms(ms: i64) -> Result<String> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .with_context(|| format!("timestamp {ms} out of range"))?;
    Ok(dt.format(&Rfc2822)?)
}

/// HTML body of an item description: optional image, then optional text.
fn item_html(item: &Item) -> String {
    let mut html = String::new();
    if let Some(img) = &item.image {
        html.push_str(&format!(
            "<img src=\"{}\" alt=\"\" />",
            html_escape::encode_double_quoted_attribute(img)
        ));
    }
    if let Some(desc) = &item.description {
        html.push_str(&format!("<p>{}</p>", html_escape::encode_text(desc)));
    }
    html
}

/// Render an RSS 2.0 document. Items are written in the order given.
pub fn render_feed(
    info: &SourceInfo,
    items: &[Item],
    self_link: &str,
    built_at: OffsetDateTime,
) -> Result<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b'\t', 1);

    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Comment(BytesText::new(" Generated by freightfeed ")))?;
    w.write_event(Event::Start(
        BytesStart::new("rss").with_attributes([("version", "2.0"), ("xmlns:atom", ATOM_NS)]),
    ))?;
    w.write_event(Event::Start(BytesStart::new("channel")))?;

    w.create_element("title")
        .write_text_content(BytesText::new(&info.name))?;
    w.create_element("link")
        .write_text_content(BytesText::new(&info.link))?;
    w.create_element("description")
        .write_text_content(BytesText::new(&info.description))?;
    w.create_element("lastBuildDate")
        .write_text_content(BytesText::new(&built_at.format(&Rfc2822)?))?;
    w.create_element("atom:link")
        .with_attributes([
            ("href", self_link),
            ("rel", "self"),
            ("type", "application/rss+xml"),
        ])
        .write_empty()?;

    for item in items {
        let pub_date = rfc2822_from_ms(item.seen_ms)?;
        w.write_event(Event::Start(BytesStart::new("item")))?;
        w.create_element("title")
            .write_text_content(BytesText::new(&item.title))?;
        w.create_element("link")
            .write_text_content(BytesText::new(&item.link))?;
        w.create_element("description")
            .write_cdata_content(BytesCData::new(item_html(item)))?;
        w.create_element("pubDate")
            .write_text_content(BytesText::new(&pub_date))?;
        w.create_element("guid")
            .write_text_content(BytesText::new(&item.guid))?;
        w.write_event(Event::End(BytesEnd::new("item")))?;
    }

    w.write_event(Event::End(BytesEnd::new("channel")))?;
    w.write_event(Event::End(BytesEnd::new("rss")))?;

    let mut out = String::from_utf8(w.into_inner()).context("feed is not utf-8")?;
    out.push('\n');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pub_date_is_rfc2822() {
        assert_eq!(
            rfc2822_from_ms(1_700_000_000_000).unwrap(),
            "Tue, 14 Nov 2023 22:13:20 +0000"
        );
    }

    #[test]
    fn item_html_escapes_and_orders_image_first() {
        let item = Item {
            title: "t".into(),
            link: "l".into(),
            guid: "g".into(),
            description: Some("a < b ]]> c".into()),
            image: Some("https://x.test/i.png?a=1&b=\"2\"".into()),
            seen_ms: 0,
            source: "A".into(),
        };
        let html = item_html(&item);
        assert!(html.starts_with("<img src=\"https://x.test/i.png?a=1&amp;b=&quot;2&quot;\""));
        assert!(html.ends_with("<p>a &lt; b ]]&gt; c</p>"));
        assert!(!html.contains("]]>"));
    }
}
