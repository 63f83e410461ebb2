//! XPath evaluation over HTML and JSON.
//!
//! HTML is parsed with `scraper` (an HTML5 parser, so real-world markup is
//! fine) and projected onto an `sxd-document` tree that `sxd-xpath` can
//! query. JSON is projected the same way: object keys become elements,
//! array items repeat their parent key and scalars become text.

use scraper::{ElementRef, Html};
use sxd_document::{Package, dom};
use sxd_xpath::{Context, Factory, Value};

use super::CheckerError;

/// Name of the synthetic root element wrapping a JSON document.
const JSON_ROOT: &str = "root";

/// Name used for items of a top-level JSON array or scalar.
const JSON_ITEM: &str = "item";

/// Checks that `expression` compiles.
pub(crate) fn validate(expression: &str) -> Result<(), String> {
    match Factory::new().build(expression) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err("empty expression".to_string()),
        Err(e) => Err(format!("{e:?}")),
    }
}

/// Evaluates `expression` and returns the text of the first match.
///
/// Node sets yield the string value of their first node in document order.
/// Expressions that produce a string, number or boolean yield that value.
fn first_text(document: &dom::Document<'_>, expression: &str) -> Result<Option<String>, CheckerError> {
    let xpath = Factory::new()
        .build(expression)
        .map_err(|e| CheckerError::XPath(format!("{e:?}")))?
        .ok_or_else(|| CheckerError::XPath("empty expression".to_string()))?;
    let context = Context::new();
    let value = xpath
        .evaluate(&context, document.root())
        .map_err(|e| CheckerError::XPath(format!("{e:?}")))?;

    Ok(match value {
        Value::Nodeset(nodes) => nodes.document_order_first().map(|node| node.string_value()),
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
    })
}

fn project_element<'d>(document: &dom::Document<'d>, target: dom::Element<'d>, source: ElementRef<'_>) {
    for child in source.children() {
        if let Some(element) = ElementRef::wrap(child) {
            let projected = document.create_element(element.value().name());
            for (name, value) in element.value().attrs() {
                projected.set_attribute_value(name, value);
            }
            target.append_child(projected);
            project_element(document, projected, element);
        } else if let Some(text) = child.value().as_text() {
            target.append_child(document.create_text(text));
        }
    }
}

/// Returns the text of the first node matching `expression` in an HTML
/// document.
pub(crate) fn first_text_in_html(html: &str, expression: &str) -> Result<Option<String>, CheckerError> {
    let parsed = Html::parse_document(html);
    let package = Package::new();
    let document = package.as_document();

    let source_root = parsed.root_element();
    let root = document.create_element(source_root.value().name());
    for (name, value) in source_root.value().attrs() {
        root.set_attribute_value(name, value);
    }
    document.root().append_child(root);
    project_element(&document, root, source_root);

    first_text(&document, expression)
}

fn project_json<'d>(
    document: &dom::Document<'d>,
    parent: dom::Element<'d>,
    name: &str,
    value: &serde_json::Value,
) {
    use serde_json::Value as Json;

    if let Json::Array(items) = value {
        for item in items {
            project_json(document, parent, name, item);
        }
        return;
    }

    let element = document.create_element(name);
    parent.append_child(element);
    match value {
        Json::Object(map) => {
            for (key, child) in map {
                project_json(document, element, key, child);
            }
        }
        Json::String(s) => element.append_child(document.create_text(s)),
        Json::Number(n) => element.append_child(document.create_text(&n.to_string())),
        Json::Bool(b) => element.append_child(document.create_text(&b.to_string())),
        Json::Null | Json::Array(_) => {}
    }
}

/// Returns the text of the first node matching `expression` in a JSON
/// document.
pub(crate) fn first_text_in_json(
    json: &serde_json::Value,
    expression: &str,
) -> Result<Option<String>, CheckerError> {
    let package = Package::new();
    let document = package.as_document();
    let root = document.create_element(JSON_ROOT);
    document.root().append_child(root);

    match json {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                project_json(&document, root, key, child);
            }
        }
        other => project_json(&document, root, JSON_ITEM, other),
    }

    first_text(&document, expression)
}
