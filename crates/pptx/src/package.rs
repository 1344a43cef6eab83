//! Base presentation package: the structural parts a deck is built on.
//!
//! A base package holds everything except the slide parts and the three
//! parts that are regenerated per deck (`ppt/presentation.xml`, its
//! relationships, and `[Content_Types].xml`). It comes from one of two
//! places: a template .pptx on disk, or the embedded blank scaffold.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::ZipArchive;

pub(crate) const SLIDE_LAYOUT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
pub(crate) const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
const SLIDE_MASTER_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";

pub(crate) const COVER_LAYOUT_PART: &str = "ppt/slideLayouts/slideLayout1.xml";
pub(crate) const CONTENT_LAYOUT_PART: &str = "ppt/slideLayouts/slideLayout2.xml";

const DEFAULT_SLIDE_SIZE: (u64, u64) = (12_192_000, 6_858_000);

/// One `<Relationship>` entry of the presentation part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RelEntry {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

impl RelEntry {
    pub fn is_master(&self) -> bool {
        self.rel_type == SLIDE_MASTER_REL_TYPE
    }
}

pub(crate) struct BasePackage {
    /// Parts copied verbatim into the output archive.
    pub parts: Vec<(String, Vec<u8>)>,
    /// Relationships of `ppt/presentation.xml` other than slides.
    pub presentation_rels: Vec<RelEntry>,
    /// `[Content_Types].xml` defaults: extension -> content type.
    pub content_defaults: Vec<(String, String)>,
    /// `[Content_Types].xml` overrides other than slides and the
    /// presentation part itself: part name -> content type.
    pub content_overrides: Vec<(String, String)>,
    pub slide_size: (u64, u64),
}

impl BasePackage {
    /// The embedded scaffold: one master, a cover layout, a content layout,
    /// a theme, and document properties.
    pub fn blank() -> Self {
        let parts = vec![
            part("_rels/.rels", ROOT_RELS),
            part("docProps/core.xml", CORE_PROPS),
            part("docProps/app.xml", APP_PROPS),
            part("ppt/theme/theme1.xml", THEME),
            part("ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER),
            part("ppt/slideMasters/_rels/slideMaster1.xml.rels", SLIDE_MASTER_RELS),
            part(COVER_LAYOUT_PART, COVER_LAYOUT),
            part("ppt/slideLayouts/_rels/slideLayout1.xml.rels", LAYOUT_RELS),
            part(CONTENT_LAYOUT_PART, CONTENT_LAYOUT),
            part("ppt/slideLayouts/_rels/slideLayout2.xml.rels", LAYOUT_RELS),
        ];

        let presentation_rels = vec![RelEntry {
            id: "rId1".to_string(),
            rel_type: SLIDE_MASTER_REL_TYPE.to_string(),
            target: "slideMasters/slideMaster1.xml".to_string(),
        }];

        let content_defaults = vec![
            (
                "rels".to_string(),
                "application/vnd.openxmlformats-package.relationships+xml".to_string(),
            ),
            ("xml".to_string(), "application/xml".to_string()),
        ];

        let content_overrides = vec![
            (
                "/ppt/slideMasters/slideMaster1.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"
                    .to_string(),
            ),
            (
                "/ppt/slideLayouts/slideLayout1.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"
                    .to_string(),
            ),
            (
                "/ppt/slideLayouts/slideLayout2.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"
                    .to_string(),
            ),
            (
                "/ppt/theme/theme1.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.theme+xml".to_string(),
            ),
            (
                "/docProps/core.xml".to_string(),
                "application/vnd.openxmlformats-package.core-properties+xml".to_string(),
            ),
            (
                "/docProps/app.xml".to_string(),
                "application/vnd.openxmlformats-officedocument.extended-properties+xml".to_string(),
            ),
        ];

        Self {
            parts,
            presentation_rels,
            content_defaults,
            content_overrides,
            slide_size: DEFAULT_SLIDE_SIZE,
        }
    }

    /// Import the structural parts of a template package.
    ///
    /// Every part except the template's own slides and the regenerated
    /// parts is carried over verbatim, so the deck inherits the template's
    /// theme, masters, and layouts. The template must provide the two
    /// standard layouts the generated slides reference.
    pub fn from_template(path: &Path) -> Result<Self, TemplateError> {
        let file = File::open(path).map_err(TemplateError::Read)?;
        let mut archive =
            ZipArchive::new(file).map_err(|error| TemplateError::Invalid(error.to_string()))?;

        let mut parts: Vec<(String, Vec<u8>)> = Vec::new();
        let mut content_types_xml: Option<String> = None;
        let mut presentation_xml: Option<String> = None;
        let mut presentation_rels_xml: Option<String> = None;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|error| TemplateError::Invalid(error.to_string()))?;
            let name = entry.name().to_string();
            if name.ends_with('/') {
                continue;
            }

            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .map_err(|error| TemplateError::Invalid(error.to_string()))?;

            match name.as_str() {
                "[Content_Types].xml" => {
                    content_types_xml = Some(into_string(bytes, &name)?);
                }
                "ppt/presentation.xml" => {
                    presentation_xml = Some(into_string(bytes, &name)?);
                }
                "ppt/_rels/presentation.xml.rels" => {
                    presentation_rels_xml = Some(into_string(bytes, &name)?);
                }
                _ if name.starts_with("ppt/slides/") => {}
                _ => parts.push((name, bytes)),
            }
        }

        let content_types_xml = content_types_xml
            .ok_or_else(|| TemplateError::Invalid("missing [Content_Types].xml".to_string()))?;
        let presentation_rels_xml = presentation_rels_xml.ok_or_else(|| {
            TemplateError::Invalid("missing ppt/_rels/presentation.xml.rels".to_string())
        })?;

        for required in [COVER_LAYOUT_PART, CONTENT_LAYOUT_PART] {
            if !parts.iter().any(|(name, _)| name == required) {
                return Err(TemplateError::Invalid(format!("missing expected part {required}")));
            }
        }

        let (content_defaults, content_overrides) = parse_content_types(&content_types_xml)?;
        let presentation_rels = parse_relationships(&presentation_rels_xml)?
            .into_iter()
            .filter(|rel| rel.rel_type != SLIDE_REL_TYPE)
            .collect::<Vec<_>>();

        if !presentation_rels.iter().any(RelEntry::is_master) {
            return Err(TemplateError::Invalid(
                "presentation has no slide master relationship".to_string(),
            ));
        }

        let slide_size = presentation_xml
            .as_deref()
            .and_then(parse_slide_size)
            .unwrap_or(DEFAULT_SLIDE_SIZE);

        Ok(Self { parts, presentation_rels, content_defaults, content_overrides, slide_size })
    }
}

#[derive(Debug)]
pub(crate) enum TemplateError {
    Read(std::io::Error),
    Invalid(String),
}

fn part(name: &str, contents: &str) -> (String, Vec<u8>) {
    (name.to_string(), contents.as_bytes().to_vec())
}

fn into_string(bytes: Vec<u8>, name: &str) -> Result<String, TemplateError> {
    String::from_utf8(bytes)
        .map_err(|_| TemplateError::Invalid(format!("part {name} is not valid UTF-8")))
}

fn parse_content_types(
    xml: &str,
) -> Result<(Vec<(String, String)>, Vec<(String, String)>), TemplateError> {
    let mut defaults = Vec::new();
    let mut overrides = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Default" => {
                    let mut extension = String::new();
                    let mut content_type = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Extension" => {
                                extension = String::from_utf8_lossy(&attr.value).to_string();
                            }
                            b"ContentType" => {
                                content_type = String::from_utf8_lossy(&attr.value).to_string();
                            }
                            _ => {}
                        }
                    }
                    defaults.push((extension, content_type));
                }
                b"Override" => {
                    let mut part_name = String::new();
                    let mut content_type = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"PartName" => {
                                part_name = String::from_utf8_lossy(&attr.value).to_string();
                            }
                            b"ContentType" => {
                                content_type = String::from_utf8_lossy(&attr.value).to_string();
                            }
                            _ => {}
                        }
                    }
                    let regenerated = part_name == "/ppt/presentation.xml"
                        || part_name.starts_with("/ppt/slides/");
                    if !regenerated {
                        overrides.push((part_name, content_type));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(TemplateError::Invalid(format!(
                    "error parsing [Content_Types].xml: {error}"
                )));
            }
            _ => {}
        }
    }

    Ok((defaults, overrides))
}

fn parse_relationships(xml: &str) -> Result<Vec<RelEntry>, TemplateError> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Type" => rel_type = String::from_utf8_lossy(&attr.value).to_string(),
                        b"Target" => target = String::from_utf8_lossy(&attr.value).to_string(),
                        _ => {}
                    }
                }

                rels.push(RelEntry { id, rel_type, target });
            }
            Ok(Event::Eof) => break,
            Err(error) => {
                return Err(TemplateError::Invalid(format!(
                    "error parsing presentation relationships: {error}"
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

fn parse_slide_size(xml: &str) -> Option<(u64, u64)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"sldSz" =>
            {
                let mut cx = None;
                let mut cy = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"cx" => cx = String::from_utf8_lossy(&attr.value).parse::<u64>().ok(),
                        b"cy" => cy = String::from_utf8_lossy(&attr.value).parse::<u64>().ok(),
                        _ => {}
                    }
                }
                return cx.zip(cy);
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Trailing digits of a relationship id like `rId12`, used to pick fresh
/// ids above everything the base package already claims.
pub(crate) fn rel_id_number(id: &str) -> Option<u32> {
    let digits: String = id.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/></Relationships>"#;

const CORE_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>Auto Docs</dc:title><dc:creator>deckgen</dc:creator><cp:lastModifiedBy>deckgen</cp:lastModifiedBy></cp:coreProperties>"#;

const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes"><Application>deckgen</Application></Properties>"#;

const SLIDE_MASTER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:bg><p:bgPr><a:solidFill><a:schemeClr val="bg1"/></a:solidFill><a:effectLst/></p:bgPr></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/><p:sldLayoutId id="2147483650" r:id="rId2"/></p:sldLayoutIdLst><p:txStyles><p:titleStyle/><p:bodyStyle/><p:otherStyle/></p:txStyles></p:sldMaster>"#;

const SLIDE_MASTER_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="../theme/theme1.xml"/></Relationships>"#;

const COVER_LAYOUT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="title" preserve="1"><p:cSld name="Title Slide"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#;

const CONTENT_LAYOUT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="obj" preserve="1"><p:cSld name="Title and Content"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#;

const LAYOUT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#;

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#;

#[cfg(test)]
mod tests {
    use super::{parse_content_types, parse_relationships, parse_slide_size, rel_id_number, BasePackage};

    #[test]
    fn blank_package_carries_expected_layouts() {
        let base = BasePackage::blank();
        assert!(base.parts.iter().any(|(name, _)| name == "ppt/slideLayouts/slideLayout1.xml"));
        assert!(base.parts.iter().any(|(name, _)| name == "ppt/slideLayouts/slideLayout2.xml"));
        assert!(base.presentation_rels.iter().any(|rel| rel.is_master()));
    }

    #[test]
    fn rel_id_numbers_parse_trailing_digits() {
        assert_eq!(rel_id_number("rId1"), Some(1));
        assert_eq!(rel_id_number("rId12"), Some(12));
        assert_eq!(rel_id_number("nodigits"), None);
    }

    #[test]
    fn content_type_parse_drops_regenerated_parts() {
        let xml = r#"<?xml version="1.0"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
<Override PartName="/ppt/slides/slide1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>
<Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>
</Types>"#;

        let (defaults, overrides) = parse_content_types(xml).expect("well-formed");
        assert_eq!(defaults.len(), 1);
        assert_eq!(overrides, vec![(
            "/ppt/theme/theme1.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.theme+xml".to_string()
        )]);
    }

    #[test]
    fn relationship_parse_reads_all_attributes() {
        let xml = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>
</Relationships>"#;

        let rels = parse_relationships(xml).expect("well-formed");
        assert_eq!(rels.len(), 2);
        assert!(rels[0].is_master());
        assert_eq!(rels[1].id, "rId2");
    }

    #[test]
    fn slide_size_parses_from_presentation_part() {
        let xml = r#"<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldSz cx="9144000" cy="6858000"/></p:presentation>"#;
        assert_eq!(parse_slide_size(xml), Some((9_144_000, 6_858_000)));
        assert_eq!(parse_slide_size("<p:presentation/>"), None);
    }
}
