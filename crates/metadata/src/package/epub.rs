//! EPUB (and kepub) package metadata.
//!
//! Both `META-INF/container.xml` and the OPF document are parsed as XML.
//! Dublin Core elements are matched by namespace; attributes are matched by
//! local name, since EPUB 2 puts `opf:role`/`opf:scheme` in the OPF namespace
//! and EPUB 3 doesn't namespace them at all.

use super::{Creator, Identifier, Meta, PackageMetadata, PackageReader};
use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use roxmltree::{Document, Node, ParsingOptions};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use tracing::instrument;
use zip::ZipArchive;
use zip::result::ZipResult;

const CONTAINER_PATH: &str = "META-INF/container.xml";
const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// Reads metadata from EPUB containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpubReader;
impl PackageReader for EpubReader {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn read(&self, path: &Path) -> Result<PackageMetadata> {
        let invalid = || ErrorKind::InvalidPackage(path.to_path_buf());
        let file = File::open(path).or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).or_raise(invalid)?;
        let container = read_entry(&mut archive, CONTAINER_PATH).or_raise(invalid)?;
        let opf_path = package_document_path(&container).ok_or_raise(invalid)?;
        let opf = read_entry(&mut archive, &opf_path).or_raise(invalid)?;
        parse_package_document(&opf).or_raise(invalid)
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> ZipResult<String> {
    let mut entry = archive.by_name(name)?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(contents)
}

fn parse_xml(xml: &str) -> std::result::Result<Document<'_>, roxmltree::Error> {
    let mut options = ParsingOptions::default();
    options.allow_dtd = true;
    Document::parse_with_options(xml.trim_start_matches('\u{feff}'), options)
}

/// Find the path of the package (OPF) document in `META-INF/container.xml`.
fn package_document_path(container: &str) -> Option<String> {
    let document = parse_xml(container).ok()?;
    document
        .descendants()
        .filter(|node| node.tag_name().name() == "rootfile")
        .find_map(|node| attr(node, "full-path"))
        .map(|path| path.trim_start_matches('/').to_string())
}

/// Attribute value by local name, whatever its namespace.
fn attr(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attributes().find(|a| a.name() == name).map(|a| a.value().to_string())
}

fn text(node: Node<'_, '_>) -> String {
    node.descendants().filter(Node::is_text).filter_map(|n| n.text()).collect::<String>().trim().to_string()
}

/// EPUB 2 puts a `<meta>` value in `content`, EPUB 3 in the element text.
fn meta_value(node: Node<'_, '_>) -> Option<String> {
    if let Some(content) = attr(node, "content") {
        return Some(content.trim().to_string());
    }
    let value = text(node);
    (!value.is_empty()).then_some(value)
}

pub(crate) fn parse_package_document(opf: &str) -> std::result::Result<PackageMetadata, roxmltree::Error> {
    let document = parse_xml(opf)?;
    let mut package = PackageMetadata::default();
    // EPUB 3 moves creator roles out of the element and into a refinement.
    let mut refined_roles: HashMap<String, String> = HashMap::new();
    let mut creators: Vec<(Option<String>, Creator)> = Vec::new();

    for node in document.descendants().filter(Node::is_element) {
        let name = node.tag_name();
        if name.name() == "meta" {
            let Some(content) = meta_value(node) else {
                continue;
            };
            if let Some(refines) = attr(node, "refines")
                && attr(node, "property").as_deref() == Some("role")
            {
                refined_roles.insert(refines.trim_start_matches('#').to_string(), content);
            } else if let Some(name) = attr(node, "name").or_else(|| attr(node, "property")) {
                package.meta.push(Meta { name, content });
            }
            continue;
        }
        if name.namespace() != Some(DC_NAMESPACE) {
            continue;
        }
        match name.name() {
            "identifier" => {
                let value = text(node);
                if !value.is_empty() {
                    package.identifiers.push(Identifier { scheme: attr(node, "scheme"), value });
                }
            },
            "title" => package.titles.push(text(node)),
            "creator" => {
                let name = text(node);
                if !name.is_empty() {
                    creators.push((attr(node, "id"), Creator { name, role: attr(node, "role") }));
                }
            },
            "description" => {
                // Descriptions are HTML, escaped once more for the XML.
                let description = html_escape::decode_html_entities(&text(node)).into_owned();
                if !description.is_empty() {
                    package.descriptions.push(description);
                }
            },
            "language" => package.languages.push(text(node)),
            "publisher" => package.publishers.push(text(node)),
            "date" => package.dates.push(text(node)),
            _ => {},
        }
    }

    package.creators = creators
        .into_iter()
        .map(|(id, mut creator)| {
            if creator.role.is_none()
                && let Some(role) = id.and_then(|id| refined_roles.get(&id))
            {
                creator.role = Some(role.clone());
            }
            creator
        })
        .collect();
    Ok(package)
}
