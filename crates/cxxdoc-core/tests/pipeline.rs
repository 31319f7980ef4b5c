//! Whole runs over a small generated documentation tree

use std::path::Path;

use cxxdoc_core::config::TagfileSpec;
use cxxdoc_core::{Config, Pipeline, Report};
use tempfile::TempDir;

const INDEX: &str = r#"<?xml version="1.0"?>
<doxygenindex>
  <compound refid="namespacens" kind="namespace"><name>ns</name></compound>
  <compound refid="classns_1_1widget" kind="class"><name>ns::widget</name></compound>
  <compound refid="dir_abc" kind="dir"><name>include</name></compound>
</doxygenindex>"#;

const NAMESPACE: &str = r#"<?xml version="1.0"?>
<doxygen>
  <compounddef id="namespacens" kind="namespace">
    <compoundname>ns</compoundname>
    <sectiondef kind="var">
      <memberdef kind="variable" id="namespacens_1a0f" prot="public" static="no">
        <type>static static int</type>
        <name>counter</name>
        <qualifiedname>ns::counter</qualifiedname>
      </memberdef>
    </sectiondef>
  </compounddef>
</doxygen>"#;

const CLASS: &str = r#"<?xml version="1.0"?>
<doxygen>
  <compounddef id="classns_1_1widget" kind="class" prot="public">
    <compoundname>ns::widget</compoundname>
    <sectiondef kind="public-func">
      <memberdef kind="function" id="classns_1_1widget_1a1" prot="public" static="no">
        <type>int</type>
        <name>size</name>
        <qualifiedname>ns::widget::size</qualifiedname>
        <argsstring>(widget other) const</argsstring>
      </memberdef>
    </sectiondef>
  </compounddef>
</doxygen>"#;

const NAMESPACE_PAGE: &str = concat!(
    "<html><body><h1>ns</h1>",
    r#"<pre class="m-code">ns::widget w; mystery m;</pre>"#,
    r#"<pre class="m-code">int n = ns::widget::size(); std::vector&lt;int&gt; v;</pre>"#,
    "</body></html>"
);

const CLASS_PAGE: &str = concat!(
    "<html><body><h1>ns::widget</h1>",
    r#"<section class="m-doc-details" id="a1"><div><h3>"#,
    r#"<span class="m-doc-wrap-bumper">int </span>"#,
    r#"<a href="" class="m-doc-self">size</a>(widget other)</h3></div></section>"#,
    "</body></html>"
);

const STD_TAGFILE: &str = r#"<?xml version="1.0"?>
<tagfile>
  <compound kind="class">
    <name>std::vector</name>
    <filename>cpp/container/vector</filename>
  </compound>
</tagfile>"#;

/// A documentation tree in a temporary directory
struct Tree {
    dir: TempDir,
}

impl Tree {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let xml = dir.path().join("xml");
        let html = dir.path().join("html");
        std::fs::create_dir(&xml).unwrap();
        std::fs::create_dir(&html).unwrap();
        std::fs::write(xml.join("index.xml"), INDEX).unwrap();
        std::fs::write(xml.join("namespacens.xml"), NAMESPACE).unwrap();
        std::fs::write(xml.join("classns_1_1widget.xml"), CLASS).unwrap();
        std::fs::write(html.join("namespacens.html"), NAMESPACE_PAGE).unwrap();
        std::fs::write(html.join("classns_1_1widget.html"), CLASS_PAGE).unwrap();
        Self { dir }
    }

    fn config(&self, threads: usize) -> Config {
        let mut config = Config::default();
        config.sources.xml_dir = self.dir.path().join("xml");
        config.sources.html_dir = self.dir.path().join("html");
        config.threads = Some(threads);
        config
    }

    fn run(&self, threads: usize) -> Report {
        Pipeline::new(self.config(threads)).run().unwrap()
    }

    fn page(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join("html").join(name)).unwrap()
    }

    fn xml(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join("xml").join(name)).unwrap()
    }

    fn files(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for sub in ["xml", "html"] {
            let mut names: Vec<String> = std::fs::read_dir(self.dir.path().join(sub))
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            for name in names {
                let content = std::fs::read_to_string(self.dir.path().join(sub).join(&name)).unwrap();
                out.push((format!("{sub}/{name}"), content));
            }
        }
        out
    }
}

fn has_attr(xml: &str, name: &str, value: &str) -> bool {
    xml.contains(&format!("{name}=\"{value}\"")) || xml.contains(&format!("{name}='{value}'"))
}

#[test]
fn test_pages_link_to_each_other() {
    let tree = Tree::new();
    let report = tree.run(2);
    assert!(report.is_success(false), "{report:?}");
    assert_eq!(report.pages_processed, 2);
    assert_eq!(report.pages_changed, 2);

    let namespace = tree.page("namespacens.html");
    assert!(namespace.contains(r#"<a href="classns_1_1widget.html" class="nc m-doc">widget</a>"#));

    let class = tree.page("classns_1_1widget.html");
    assert!(class.contains(r#"<a href="namespacens.html" class="nn m-doc">ns</a>"#));
}

#[test]
fn test_member_links_to_its_class_page() {
    let tree = Tree::new();
    tree.run(1);

    let namespace = tree.page("namespacens.html");
    assert!(namespace.contains(r#"<a href="classns_1_1widget.html#a1" class="nf m-doc">size</a>"#));
    // no tagfile knows the standard library
    assert!(!namespace.contains(">vector</a>"));
}

#[test]
fn test_tagfile_symbols_link_externally() {
    let tree = Tree::new();
    let tagfile = tree.dir.path().join("std.tag");
    std::fs::write(&tagfile, STD_TAGFILE).unwrap();
    let mut config = tree.config(2);
    config.tagfiles.push(TagfileSpec {
        path: tagfile,
        url: String::from("https://en.cppreference.com/w/"),
    });

    let report = Pipeline::new(config).run().unwrap();
    assert!(report.is_success(false), "{report:?}");
    let namespace = tree.page("namespacens.html");
    assert!(namespace.contains(concat!(
        r#"<a href="https://en.cppreference.com/w/cpp/container/vector" "#,
        r#"class="nc m-doc external" target="_blank">vector</a>"#
    )));
    // local symbols keep their local pages
    assert!(namespace.contains(r#"<a href="classns_1_1widget.html" class="nc m-doc">widget</a>"#));
}

#[test]
fn test_signature_header_does_not_link_itself() {
    let tree = Tree::new();
    tree.run(1);

    let class = tree.page("classns_1_1widget.html");
    // the title documents the page's own class
    assert!(class.contains(concat!(
        r#"<h1><a href="namespacens.html" class="nn m-doc">ns</a>"#,
        r#"<span class="o">::</span><span class="nc">widget</span></h1>"#
    )));
    // inside a member header the class is an ordinary reference
    assert!(class.contains(r#"<a href="classns_1_1widget.html" class="nc m-doc">widget</a>"#));
    assert!(class.contains(r#"<a href="" class="m-doc-self">size</a>"#));

    let namespace = tree.page("namespacens.html");
    assert!(namespace.contains(r#"<h1><span class="nn">ns</span></h1>"#));
}

#[test]
fn test_unknown_names_pass_through() {
    let tree = Tree::new();
    let report = tree.run(1);

    let namespace = tree.page("namespacens.html");
    assert!(namespace.contains("mystery"));
    assert!(!namespace.contains(">mystery</a>"));
    assert_eq!(report.failed_units, Vec::new());
}

#[test]
fn test_doubled_static_is_repaired_in_xml() {
    let tree = Tree::new();
    Pipeline::new(tree.config(1)).xml_only(true).run().unwrap();

    let xml = tree.xml("namespacens.xml");
    assert!(xml.contains("<type>int</type>"), "{xml}");
    assert!(!xml.contains("static static"));
    assert!(has_attr(&xml, "static", "yes"));

    // pages are untouched without the resolve phase
    assert_eq!(tree.page("namespacens.html"), NAMESPACE_PAGE);
}

#[test]
fn test_output_does_not_depend_on_thread_count() {
    let serial = Tree::new();
    let parallel = Tree::new();
    let serial_report = serial.run(1);
    let parallel_report = parallel.run(4);

    assert_eq!(serial.files(), parallel.files());
    assert_eq!(serial_report.to_json().unwrap(), parallel_report.to_json().unwrap());
}

#[test]
fn test_second_run_changes_nothing() {
    let tree = Tree::new();
    tree.run(2);
    let first = tree.files();

    let again = tree.run(2);
    assert_eq!(again.pages_processed, 2);
    assert_eq!(again.pages_changed, 0);
    assert_eq!(tree.files(), first);
}

#[test]
fn test_missing_xml_dir_is_fatal() {
    let tree = Tree::new();
    let mut config = tree.config(1);
    config.sources.xml_dir = Path::new("/nonexistent/cxxdoc/xml").to_path_buf();
    let err = Pipeline::new(config).run().unwrap_err();
    assert!(matches!(err, cxxdoc_core::Error::MissingInput(_)));
}

#[test]
fn test_broken_compound_is_isolated() {
    let tree = Tree::new();
    std::fs::write(tree.dir.path().join("xml").join("classns_1_1widget.xml"), "<doxygen><compounddef>").unwrap();

    let report = tree.run(2);
    assert!(!report.failed_units.is_empty());
    assert!(report
        .failed_units
        .iter()
        .all(|f| f.unit == "classns_1_1widget.xml"));
    // the namespace page still resolves what survived
    let namespace = tree.page("namespacens.html");
    assert!(namespace.contains(r#"class="nn m-doc">ns</a>"#));
    assert!(!report.is_success(false));
}
