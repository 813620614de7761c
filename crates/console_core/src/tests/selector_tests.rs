use super::*;
use crate::document::el;

fn panel() -> Document {
    let mut doc = Document::default();
    let root = doc.root();
    doc.build(
        root,
        el("div").class("machines").child(
            el("div").class("content").child(
                el("ul")
                    .child(el("li").attr("data-id", "0").text("0"))
                    .child(el("li").attr("data-id", "1").text("1")),
            ),
        ),
    );
    doc.build(
        root,
        el("div")
            .class("config-file")
            .child(el("input").attr("type", "file")),
    );
    doc
}

#[test]
fn descendant_chain_matches_nested_items() {
    let doc = panel();
    let items = doc
        .select_all(doc.root(), ".machines .content li")
        .expect("selector");
    assert_eq!(items.len(), 2);
}

#[test]
fn attribute_values_may_be_quoted_or_bare() {
    let doc = panel();
    let quoted = doc
        .select(doc.root(), ".machines li[data-id=\"1\"]")
        .expect("selector");
    let bare = doc
        .select(doc.root(), ".machines li[data-id=1]")
        .expect("selector");
    assert!(quoted.is_some());
    assert_eq!(quoted, bare);
    assert!(doc
        .select(doc.root(), "li[data-id='9']")
        .expect("selector")
        .is_none());
}

#[test]
fn compound_requires_every_part() {
    let doc = panel();
    assert!(doc
        .select(doc.root(), ".config-file input[type=file]")
        .expect("selector")
        .is_some());
    assert!(doc
        .select(doc.root(), ".config-file input[type=text]")
        .expect("selector")
        .is_none());
    assert!(doc
        .select(doc.root(), ".machines input")
        .expect("selector")
        .is_none());
}

#[test]
fn rejects_malformed_selectors() {
    assert_eq!(Selector::parse("   "), Err(SelectorError::Empty));
    assert!(matches!(
        Selector::parse("li[data-id"),
        Err(SelectorError::UnterminatedAttribute(_))
    ));
    assert!(matches!(
        Selector::parse("li > a"),
        Err(SelectorError::Unexpected { found: '>', .. })
    ));
    assert!(matches!(
        Selector::parse("li."),
        Err(SelectorError::Unexpected { found: '.', .. })
    ));
}

#[test]
fn closest_stops_at_scope() {
    let doc = panel();
    let item = doc
        .select(doc.root(), "li[data-id=0]")
        .expect("selector")
        .expect("item");
    let machines = Selector::parse(".machines").expect("selector");
    assert!(doc.closest(item, &machines, doc.root()).is_some());

    let content = doc
        .select(doc.root(), ".content")
        .expect("selector")
        .expect("content");
    assert!(doc.closest(item, &machines, content).is_none());
}
