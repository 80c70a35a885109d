use crate::ingest::types::SourceInfo;

/// HTML page linking every visible source's feed file. Hidden sources are
/// left out entirely.
pub fn render_index<'a, I>(sources: I) -> String
where
    I: IntoIterator<Item = &'a SourceInfo>,
{
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n\t<head>\n\t\t<meta charset=\"utf-8\" />\n\t\t<title>List of RSS feeds available</title>\n\t</head>\n\t<body>\n\t\t<ul>\n",
    );
    for info in sources.into_iter().filter(|s| !s.hidden) {
        html.push_str(&format!(
            "\t\t\t<li><a href=\"{}.xml\">{}</a></li>\n",
            html_escape::encode_double_quoted_attribute(&info.class_name),
            html_escape::encode_text(&info.name)
        ));
    }
    html.push_str("\t\t</ul>\n\t</body>\n</html>\n");
    html
}
