use super::*;

fn sample() -> (Document, NodeId, NodeId) {
    let mut doc = Document::default();
    let root = doc.root();
    let list = doc.build(
        root,
        el("ul")
            .class("items")
            .child(el("li").attr("data-id", "a").text("first"))
            .child(el("li").attr("data-id", "b").text("second")),
    );
    let extra = doc.create_element("li");
    (doc, list, extra)
}

#[test]
fn build_and_text_content_follow_document_order() {
    let (doc, list, _) = sample();
    assert_eq!(doc.children(list).len(), 2);
    assert_eq!(doc.text_content(list), "firstsecond");
}

#[test]
fn insert_moves_existing_child_instead_of_duplicating() {
    let (mut doc, list, _) = sample();
    let second = doc.children(list)[1];
    doc.insert_child(list, 0, second);
    assert_eq!(doc.children(list).len(), 2);
    assert_eq!(doc.children(list)[0], second);
    assert_eq!(doc.index_in_parent(second), Some(0));
}

#[test]
fn removed_nodes_are_inert_and_detached() {
    let (mut doc, list, _) = sample();
    let first = doc.children(list)[0];
    doc.remove(first);
    assert!(!doc.contains(first));
    assert!(!doc.is_attached(first));
    assert_eq!(doc.children(list).len(), 1);

    doc.set_text(first, "ignored");
    assert_eq!(doc.text(first), "");
}

#[test]
fn created_nodes_are_detached_until_appended() {
    let (mut doc, list, extra) = sample();
    assert!(!doc.is_attached(extra));
    doc.append_child(list, extra);
    assert!(doc.is_attached(extra));

    doc.detach();
    assert!(!doc.is_attached(extra));
    doc.attach();
    assert!(doc.is_attached(extra));
}

#[test]
fn visibility_accounts_for_hidden_ancestors() {
    let (mut doc, list, _) = sample();
    let first = doc.children(list)[0];
    assert!(doc.is_visible(first));
    doc.hide(list);
    assert!(!doc.is_visible(first));
    doc.show(list);
    assert!(doc.is_visible(first));
}

#[test]
fn cannot_insert_node_under_its_own_descendant() {
    let (mut doc, list, _) = sample();
    let first = doc.children(list)[0];
    doc.insert_child(first, 0, list);
    assert_eq!(doc.parent(list), Some(doc.root()));
}

#[test]
fn replace_keeps_position() {
    let (mut doc, list, _) = sample();
    let first = doc.children(list)[0];
    let replacement = doc
        .replace(first, el("li").attr("data-id", "z"))
        .expect("replaced");
    assert_eq!(doc.children(list)[0], replacement);
    assert_eq!(doc.attr(replacement, "data-id"), Some("z"));
}

#[test]
fn markup_lists_classes_and_attributes() {
    let (doc, list, _) = sample();
    let markup = doc.to_markup(list);
    assert!(markup.contains("<ul class=\"items\">"));
    assert!(markup.contains("<li data-id=\"a\">first</li>"));
}
