//! XMLTV output

use flate2::write::GzEncoder;
use flate2::Compression;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;
use std::path::Path;

use super::node::{XmlContent, XmlNode};
use crate::errors::OutputError;

/// Identifies this tool on the `<tv>` root
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorInfo {
    pub name: String,
    pub url: String,
}

/// Serialise a complete XMLTV document around the given `<tv>` children
pub fn render_guide(children: &[XmlNode], generator: &GeneratorInfo) -> Result<Vec<u8>, OutputError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("tv");
    root.push_attribute(("generator-info-name", generator.name.as_str()));
    root.push_attribute(("generator-info-url", generator.url.as_str()));
    emit(&mut writer, Event::Start(root))?;

    for child in children {
        write_node(&mut writer, child)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("tv")))?;

    let mut out = writer.into_inner();
    out.push(b'\n');
    Ok(out)
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<(), OutputError> {
    // Text and mixed content go out exactly as stored, unindented
    if node.has_text() {
        writer.write_indent().map_err(|e| OutputError::Xml(e.to_string()))?;
        return write_verbatim(&mut Writer::new(writer.get_mut()), node);
    }

    let start = start_tag(node);
    if node.content.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in node.elements() {
        write_node(writer, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(node.name.as_str())))
}

fn write_verbatim<W: Write>(writer: &mut Writer<W>, node: &XmlNode) -> Result<(), OutputError> {
    let start = start_tag(node);
    if node.content.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for item in &node.content {
        match item {
            XmlContent::Text(text) => emit(writer, Event::Text(BytesText::new(text)))?,
            XmlContent::Element(child) => write_verbatim(writer, child)?,
        }
    }
    emit(writer, Event::End(BytesEnd::new(node.name.as_str())))
}

fn start_tag(node: &XmlNode) -> BytesStart<'_> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    start
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), OutputError> {
    writer
        .write_event(event)
        .map_err(|e| OutputError::Xml(e.to_string()))
}

/// Render and write the guide, replacing whatever is at `path`.
///
/// A path ending in `.gz` is written gzip-compressed. Returns bytes written.
pub fn write_guide(path: &Path, children: &[XmlNode], generator: &GeneratorInfo) -> Result<u64, OutputError> {
    let io_err = |source| OutputError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut data = render_guide(children, generator)?;

    let compress = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"));
    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).map_err(io_err)?;
        data = encoder.finish().map_err(io_err)?;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, &data).map_err(io_err)?;

    Ok(data.len() as u64)
}
