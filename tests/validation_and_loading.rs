//! Integration of the runtime with the schema validator, the document
//! loader, and secondary result destinations.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use xylem::runtime::{
    Context, DocumentLoader, EngineError, FnBody, InMemoryResourceProvider, SimplePattern,
    Stylesheet, TemplateRule, TransformOptions, Transformer,
};
use xylem::schema::{
    AttributeDecl, ComplexType, ContentModel, ElementDecl, Particle, PrimitiveType, Schema,
    SimpleType, TypeDef,
};
use xylem::serializer::{
    OutputHandler, OutputProperties, ResultDocumentHandler, XmlSerializer,
};
use xylem::xdm::{ExpandedName, QName, ValidationMode};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn order_schema() -> Rc<Schema> {
    let mut schema = Schema::new();
    let order_type = ComplexType::new(ContentModel::ElementOnly(Particle::Element {
        name: ExpandedName::local("item"),
        min: 1,
        max: None,
    }))
    .with_attribute(
        AttributeDecl {
            name: ExpandedName::local("total"),
            simple_type: SimpleType::new(PrimitiveType::Decimal),
        },
        false,
    );
    schema.add_element(ElementDecl::new(
        ExpandedName::local("order"),
        TypeDef::Complex(order_type),
    ));
    schema.add_element(ElementDecl::new(
        ExpandedName::local("item"),
        TypeDef::Simple(SimpleType::new(PrimitiveType::Integer)),
    ));
    Rc::new(schema)
}

#[test]
fn bodies_validate_constructed_output_through_the_context() {
    init_logging();
    let mut stylesheet = Stylesheet::new("3.0");
    stylesheet.add_template(TemplateRule::matching(
        Rc::new(SimplePattern::parse("/").unwrap()),
        Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
            let validator = ctx.validator().expect("validator installed").clone();
            let mut validator = validator.borrow_mut();
            validator.start_element(&ExpandedName::local("order"), ValidationMode::Strict)?;
            let annotation = validator
                .validate_attribute(&ExpandedName::local("total"), "19.99")?
                .expect("decimal annotation");
            assert_eq!(annotation.local_name, "decimal");

            validator.add_child_element(&ExpandedName::local("item"))?;
            validator.start_element(&ExpandedName::local("item"), ValidationMode::Strict)?;
            validator.add_text_content("42");
            validator.end_element()?;
            validator.end_element()?;
            Ok(())
        })),
    ));
    let transformer = Transformer::new(Rc::new(stylesheet), TransformOptions::default())
        .unwrap()
        .with_schema(order_schema());
    transformer.transform_to_string("<x/>").unwrap();
}

#[test]
fn strict_validation_failure_carries_its_code() {
    init_logging();
    let mut stylesheet = Stylesheet::new("3.0");
    stylesheet.add_template(TemplateRule::matching(
        Rc::new(SimplePattern::parse("/").unwrap()),
        Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
            let validator = ctx.validator().expect("validator installed").clone();
            let mut validator = validator.borrow_mut();
            validator.start_element(&ExpandedName::local("item"), ValidationMode::Strict)?;
            validator.add_text_content("not a number");
            validator.end_element()?;
            Ok(())
        })),
    ));
    let transformer = Transformer::new(Rc::new(stylesheet), TransformOptions::default())
        .unwrap()
        .with_schema(order_schema());
    let err = transformer.transform_to_string("<x/>").unwrap_err();
    assert_eq!(err.code(), Some("XTTE0505"));
}

#[test]
fn document_loader_feeds_templates() {
    init_logging();
    let provider = Arc::new(InMemoryResourceProvider::new());
    provider.add_str("/data/prices.xml", "<prices><p>9</p><p>11</p></prices>");
    let loader = Rc::new(DocumentLoader::new(provider));

    let mut stylesheet = Stylesheet::new("3.0");
    stylesheet.add_template(TemplateRule::matching(
        Rc::new(SimplePattern::parse("/").unwrap()),
        Rc::new(FnBody(|_ctx: &Context| -> Result<(), EngineError> {
            Ok(())
        })),
    ));
    let mut options = TransformOptions::default();
    options.output.omit_xml_declaration = true;
    let transformer = Transformer::new(Rc::new(stylesheet), options)
        .unwrap()
        .with_loader(loader);

    let loader = transformer.document_loader().unwrap();
    let doc = loader.load_or_error("/data/prices.xml", None).unwrap();
    assert_eq!(doc.string_value(), "911");
    // A second resolution returns the same tree within the transformation.
    assert!(doc.same_node(&loader.load("/data/prices.xml", None).unwrap()));
    // Unknown documents: the non-throwing form is silent, the throwing
    // form is FODC0002.
    assert!(loader.load("/data/missing.xml", None).is_none());
    assert_eq!(
        loader
            .load_or_error("/data/missing.xml", None)
            .unwrap_err()
            .code(),
        Some("FODC0002")
    );
}

#[test]
fn character_map_applies_through_the_transformer_pipeline() {
    init_logging();
    let mut stylesheet = Stylesheet::new("3.0");
    stylesheet.add_template(TemplateRule::matching(
        Rc::new(SimplePattern::parse("/").unwrap()),
        Rc::new(FnBody(|ctx: &Context| -> Result<(), EngineError> {
            let out = ctx.checked_output()?;
            let mut out = out.borrow_mut();
            out.start_element(&QName::new("price"))?;
            out.characters("12 € & up")?;
            out.end_element(&QName::new("price"))?;
            Ok(())
        })),
    ));
    let mut options = TransformOptions::default();
    options.output.omit_xml_declaration = true;
    options.output.character_map.insert('€', "&#8364;".to_string());
    let transformer = Transformer::new(Rc::new(stylesheet), options).unwrap();
    let result = transformer.transform_to_string("<x/>").unwrap();
    // The mapped code point is written raw; everything else still escapes.
    assert_eq!(result, "<price>12 &#8364; &amp; up</price>");
}

#[test]
fn result_document_applies_character_map() {
    init_logging();
    let props = OutputProperties::default().without_declaration();
    let xml = XmlSerializer::with_properties(Vec::new(), props);
    let mut map = HashMap::new();
    map.insert('€', "&#8364;".to_string());
    let mut handler = ResultDocumentHandler::new(xml, map);

    handler.start_document().unwrap();
    handler.start_element(&QName::new("price")).unwrap();
    handler.characters("12 € & up").unwrap();
    handler.end_element(&QName::new("price")).unwrap();
    handler.end_document().unwrap();

    let out = String::from_utf8(handler.into_inner().into_inner()).unwrap();
    assert_eq!(out, "<price>12 &#8364; &amp; up</price>");
}
