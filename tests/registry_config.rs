use std::fs;

use freightfeed::config::sources::load_source_defs;
use freightfeed::ingest::registry::SourceRegistry;

#[test]
fn definitions_file_registers_sources_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("sources.toml");
    fs::write(
        &p,
        r#"
[[source]]
class = "Harbour"
name = "Harbour Notices"
link = "https://harbour.test/"
description = "Notices"

[[source]]
class = "Customs"
name = "Customs"
link = "https://customs.test/"
description = "Bulletins"
hidden = true

[[source]]
class = "Harbour"
name = "Duplicate"
link = "https://dup.test/"
description = "Dup"

[[source]]
class = "Bad Name"
name = "Bad"
link = "https://bad.test/"
description = "Bad"
"#,
    )
    .unwrap();

    let defs = load_source_defs(&p).unwrap();
    assert_eq!(defs.len(), 4);

    let reg = SourceRegistry::from_defs(&defs, reqwest::Client::new());
    assert_eq!(reg.class_names(), vec!["Harbour", "Customs", "Bad Name"]);

    let sources = reg.resolve(None);
    let classes: Vec<_> = sources.iter().map(|s| s.class_name().to_string()).collect();
    assert_eq!(classes, vec!["Harbour", "Customs"]);
    assert!(sources[1].hidden());
    assert_eq!(sources[0].name(), "Harbour Notices");
}
