use std::io::{Cursor, Write};
use std::path::PathBuf;

use chrono::{FixedOffset, Utc};
use deckgen_core::config::DeckConfig;
use deckgen_core::outline::Outline;
use quick_xml::escape::escape;
use thiserror::Error;
use zip::write::FileOptions;
use zip::ZipWriter;

use crate::package::{
    rel_id_number, BasePackage, RelEntry, TemplateError, CONTENT_LAYOUT_PART, COVER_LAYOUT_PART,
    SLIDE_LAYOUT_REL_TYPE, SLIDE_REL_TYPE,
};

pub const PPTX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

const PRESENTATION_PART_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const SLIDE_PART_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";
const PML_NAMESPACES: &str = "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\" \
     xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\" \
     xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\"";

/// Bullet run size, in DrawingML hundredths of a point (18 pt).
const BULLET_FONT_SZ: u32 = 1800;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("could not read template `{path}`: {source}")]
    TemplateRead { path: PathBuf, source: std::io::Error },
    #[error("template `{path}` is not a usable presentation package: {detail}")]
    TemplateInvalid { path: PathBuf, detail: String },
    #[error("could not write presentation package: {0}")]
    Package(#[from] zip::result::ZipError),
    #[error("could not write presentation package: {0}")]
    Io(#[from] std::io::Error),
}

/// Timestamp string embedded in the cover slide and the artifact filename,
/// rendered in a fixed UTC offset.
pub fn generation_stamp(offset_hours: i8) -> String {
    let now = Utc::now();
    match FixedOffset::east_opt(i32::from(offset_hours) * 3600) {
        Some(offset) => now.with_timezone(&offset).format("%Y%m%d-%H%M%S").to_string(),
        None => now.format("%Y%m%d-%H%M%S").to_string(),
    }
}

/// Maps an outline onto a presentation package.
///
/// The first outline entry becomes a cover slide (title plus a generation
/// stamp); every later entry becomes a content slide with one paragraph per
/// bullet. Structural parts come from the template at `template_path` when
/// it exists, otherwise from the embedded blank scaffold.
pub struct DeckBuilder {
    template_path: PathBuf,
}

impl DeckBuilder {
    pub fn new(template_path: impl Into<PathBuf>) -> Self {
        Self { template_path: template_path.into() }
    }

    pub fn from_config(config: &DeckConfig) -> Self {
        Self::new(config.template_path.clone())
    }

    /// Serialize the assembled deck into an in-memory .pptx buffer.
    pub fn assemble(&self, outline: &Outline, stamp: &str) -> Result<Vec<u8>, DeckError> {
        let base = self.load_base()?;
        let slide_count = outline.len();
        let first_slide_rel = next_rel_id(&base.presentation_rels);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default();

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(content_types_xml(&base, slide_count).as_bytes())?;

        for (name, bytes) in &base.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        zip.start_file("ppt/presentation.xml", options)?;
        zip.write_all(presentation_xml(&base, slide_count, first_slide_rel).as_bytes())?;

        zip.start_file("ppt/_rels/presentation.xml.rels", options)?;
        zip.write_all(presentation_rels_xml(&base, slide_count, first_slide_rel).as_bytes())?;

        for (index, slide) in outline.slides().iter().enumerate() {
            let number = index + 1;
            let (xml, layout) = if index == 0 {
                (cover_slide_xml(&slide.title, stamp), COVER_LAYOUT_PART)
            } else {
                (content_slide_xml(&slide.title, &slide.bullets), CONTENT_LAYOUT_PART)
            };

            zip.start_file(format!("ppt/slides/slide{number}.xml"), options)?;
            zip.write_all(xml.as_bytes())?;

            let layout_target = format!("../{}", layout.trim_start_matches("ppt/"));
            zip.start_file(format!("ppt/slides/_rels/slide{number}.xml.rels"), options)?;
            zip.write_all(slide_rels_xml(&layout_target).as_bytes())?;
        }

        tracing::debug!(
            event_name = "pptx.deck.assembled",
            slide_count,
            "deck package assembled"
        );

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }

    fn load_base(&self) -> Result<BasePackage, DeckError> {
        if !self.template_path.exists() {
            tracing::debug!(
                event_name = "pptx.template.fallback",
                path = %self.template_path.display(),
                "template not found, using blank scaffold"
            );
            return Ok(BasePackage::blank());
        }

        BasePackage::from_template(&self.template_path).map_err(|error| match error {
            TemplateError::Read(source) => {
                DeckError::TemplateRead { path: self.template_path.clone(), source }
            }
            TemplateError::Invalid(detail) => {
                DeckError::TemplateInvalid { path: self.template_path.clone(), detail }
            }
        })
    }
}

fn next_rel_id(rels: &[RelEntry]) -> u32 {
    rels.iter().filter_map(|rel| rel_id_number(&rel.id)).max().unwrap_or(0) + 1
}

fn content_types_xml(base: &BasePackage, slide_count: usize) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    );
    for (extension, content_type) in &base.content_defaults {
        xml.push_str(&format!(
            "<Default Extension=\"{}\" ContentType=\"{}\"/>",
            escape(extension),
            escape(content_type)
        ));
    }
    xml.push_str(&format!(
        "<Override PartName=\"/ppt/presentation.xml\" ContentType=\"{PRESENTATION_PART_CONTENT_TYPE}\"/>"
    ));
    for (part_name, content_type) in &base.content_overrides {
        xml.push_str(&format!(
            "<Override PartName=\"{}\" ContentType=\"{}\"/>",
            escape(part_name),
            escape(content_type)
        ));
    }
    for number in 1..=slide_count {
        xml.push_str(&format!(
            "<Override PartName=\"/ppt/slides/slide{number}.xml\" ContentType=\"{SLIDE_PART_CONTENT_TYPE}\"/>"
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn presentation_xml(base: &BasePackage, slide_count: usize, first_slide_rel: u32) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(&format!("<p:presentation {PML_NAMESPACES}>"));

    xml.push_str("<p:sldMasterIdLst>");
    for (index, rel) in base.presentation_rels.iter().filter(|rel| rel.is_master()).enumerate() {
        xml.push_str(&format!(
            "<p:sldMasterId id=\"{}\" r:id=\"{}\"/>",
            2_147_483_648u64 + index as u64,
            escape(&rel.id)
        ));
    }
    xml.push_str("</p:sldMasterIdLst>");

    xml.push_str("<p:sldIdLst>");
    for index in 0..slide_count {
        xml.push_str(&format!(
            "<p:sldId id=\"{}\" r:id=\"rId{}\"/>",
            256 + index,
            first_slide_rel + index as u32
        ));
    }
    xml.push_str("</p:sldIdLst>");

    xml.push_str(&format!(
        "<p:sldSz cx=\"{}\" cy=\"{}\"/><p:notesSz cx=\"6858000\" cy=\"9144000\"/></p:presentation>",
        base.slide_size.0, base.slide_size.1
    ));
    xml
}

fn presentation_rels_xml(base: &BasePackage, slide_count: usize, first_slide_rel: u32) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for rel in &base.presentation_rels {
        xml.push_str(&format!(
            "<Relationship Id=\"{}\" Type=\"{}\" Target=\"{}\"/>",
            escape(&rel.id),
            escape(&rel.rel_type),
            escape(&rel.target)
        ));
    }
    for index in 0..slide_count {
        xml.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"{SLIDE_REL_TYPE}\" Target=\"slides/slide{}.xml\"/>",
            first_slide_rel + index as u32,
            index + 1
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn slide_rels_xml(layout_target: &str) -> String {
    format!(
        "{XML_DECL}<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
         <Relationship Id=\"rId1\" Type=\"{SLIDE_LAYOUT_REL_TYPE}\" Target=\"{layout_target}\"/>\
         </Relationships>"
    )
}

fn cover_slide_xml(title: &str, stamp: &str) -> String {
    let mut xml = slide_open();
    xml.push_str(&placeholder_shape(
        2,
        "Title 1",
        "<p:ph type=\"ctrTitle\"/>",
        (1_524_000, 1_122_363, 9_144_000, 2_387_600),
        &format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", escape(title)),
    ));
    xml.push_str(&placeholder_shape(
        3,
        "Subtitle 2",
        "<p:ph type=\"subTitle\" idx=\"1\"/>",
        (1_524_000, 3_602_038, 9_144_000, 1_655_762),
        &format!("<a:p><a:r><a:t>Generated {}</a:t></a:r></a:p>", escape(stamp)),
    ));
    xml.push_str(SLIDE_CLOSE);
    xml
}

fn content_slide_xml(title: &str, bullets: &[String]) -> String {
    // The body text frame is built fresh, so it only ever contains the
    // outline's bullets; a text body still needs at least one paragraph.
    let body = if bullets.is_empty() {
        "<a:p/>".to_string()
    } else {
        bullets
            .iter()
            .map(|bullet| {
                format!(
                    "<a:p><a:r><a:rPr lang=\"en-US\" sz=\"{BULLET_FONT_SZ}\" dirty=\"0\"/><a:t>{}</a:t></a:r></a:p>",
                    escape(bullet)
                )
            })
            .collect()
    };

    let mut xml = slide_open();
    xml.push_str(&placeholder_shape(
        2,
        "Title 1",
        "<p:ph type=\"title\"/>",
        (838_200, 365_125, 10_515_600, 1_325_563),
        &format!("<a:p><a:r><a:t>{}</a:t></a:r></a:p>", escape(title)),
    ));
    xml.push_str(&placeholder_shape(
        3,
        "Content Placeholder 2",
        "<p:ph idx=\"1\"/>",
        (838_200, 1_825_625, 10_515_600, 4_351_338),
        &body,
    ));
    xml.push_str(SLIDE_CLOSE);
    xml
}

fn slide_open() -> String {
    format!(
        "{XML_DECL}<p:sld {PML_NAMESPACES}><p:cSld><p:spTree>\
         <p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
         <p:grpSpPr/>"
    )
}

const SLIDE_CLOSE: &str =
    "</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>";

fn placeholder_shape(
    id: u32,
    name: &str,
    placeholder: &str,
    frame: (u64, u64, u64, u64),
    paragraphs: &str,
) -> String {
    let (x, y, cx, cy) = frame;
    format!(
        "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"{name}\"/>\
         <p:cNvSpPr><a:spLocks noGrp=\"1\"/></p:cNvSpPr><p:nvPr>{placeholder}</p:nvPr></p:nvSpPr>\
         <p:spPr><a:xfrm><a:off x=\"{x}\" y=\"{y}\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm></p:spPr>\
         <p:txBody><a:bodyPr/><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"
    )
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use deckgen_core::outline::{Outline, SlideContent};
    use quick_xml::events::Event;
    use quick_xml::Reader;
    use zip::ZipArchive;

    use super::{generation_stamp, DeckBuilder, DeckError};

    fn dubai_outline() -> Outline {
        Outline::new(vec![
            SlideContent { title: "Dubai Overview".into(), bullets: vec![] },
            SlideContent {
                title: "Burj Khalifa".into(),
                bullets: vec![
                    "Tallest building".into(),
                    "Observation deck".into(),
                    "Evening light show".into(),
                ],
            },
        ])
        .expect("non-empty outline")
    }

    fn outline_of(titles: &[&str]) -> Outline {
        Outline::new(
            titles
                .iter()
                .map(|title| SlideContent { title: (*title).into(), bullets: vec!["b".into()] })
                .collect(),
        )
        .expect("non-empty outline")
    }

    fn missing_template_builder() -> DeckBuilder {
        DeckBuilder::new("does/not/exist/template.pptx")
    }

    fn read_part(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).expect("deck is a zip");
        let mut file = archive.by_name(name).expect("part exists");
        let mut contents = String::new();
        file.read_to_string(&mut contents).expect("part is utf-8");
        contents
    }

    fn slide_part_names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes.to_vec())).expect("deck is a zip");
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|name| {
                name.starts_with("ppt/slides/slide")
                    && name.ends_with(".xml")
                    && !name.contains("_rels")
            })
            .map(String::from)
            .collect();
        names.sort();
        names
    }

    /// Text runs of a slide part, with the `sz` attribute of each run's
    /// properties when present.
    fn slide_runs(xml: &str) -> Vec<(String, Option<String>)> {
        let mut runs = Vec::new();
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut pending_sz: Option<String> = None;
        let mut in_text = false;

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) if e.name().as_ref() == b"a:rPr" => {
                    pending_sz = e.attributes().flatten().find_map(|attr| {
                        (attr.key.as_ref() == b"sz")
                            .then(|| String::from_utf8_lossy(&attr.value).to_string())
                    });
                }
                Ok(Event::Start(ref e)) if e.name().as_ref() == b"a:t" => in_text = true,
                Ok(Event::Text(ref e)) if in_text => {
                    let text = e.unescape().unwrap_or_default().to_string();
                    runs.push((text, pending_sz.take()));
                }
                Ok(Event::End(ref e)) if e.name().as_ref() == b"a:t" => in_text = false,
                Ok(Event::Eof) => break,
                Err(_) => break,
                _ => {}
            }
        }

        runs
    }

    #[test]
    fn dubai_outline_produces_two_slides_with_sized_bullets() {
        let deck = missing_template_builder()
            .assemble(&dubai_outline(), "20250101-090000")
            .expect("assembly succeeds");

        assert_eq!(
            slide_part_names(&deck),
            vec!["ppt/slides/slide1.xml".to_string(), "ppt/slides/slide2.xml".to_string()]
        );

        let slide2 = read_part(&deck, "ppt/slides/slide2.xml");
        let runs = slide_runs(&slide2);
        assert_eq!(runs[0].0, "Burj Khalifa");
        let bullets: Vec<_> = runs[1..].to_vec();
        assert_eq!(bullets.len(), 3);
        for (text, sz) in &bullets {
            assert!(!text.is_empty());
            assert_eq!(sz.as_deref(), Some("1800"), "bullet runs render at the fixed size");
        }
        assert_eq!(bullets[0].0, "Tallest building");
        assert_eq!(bullets[2].0, "Evening light show");
    }

    #[test]
    fn every_outline_entry_becomes_a_slide() {
        let outline = outline_of(&["Cover", "One", "Two", "Three", "Four"]);
        let deck = missing_template_builder()
            .assemble(&outline, "20250101-090000")
            .expect("assembly succeeds");

        assert_eq!(slide_part_names(&deck).len(), 5);

        let presentation = read_part(&deck, "ppt/presentation.xml");
        assert_eq!(presentation.matches("<p:sldId ").count(), 5);

        let content_types = read_part(&deck, "[Content_Types].xml");
        assert_eq!(content_types.matches("/ppt/slides/slide").count(), 5);
    }

    #[test]
    fn cover_renders_title_and_generation_stamp() {
        let deck = missing_template_builder()
            .assemble(&dubai_outline(), "20250101-090000")
            .expect("assembly succeeds");

        let cover = read_part(&deck, "ppt/slides/slide1.xml");
        let runs = slide_runs(&cover);
        assert_eq!(runs[0].0, "Dubai Overview");
        assert_eq!(runs[1].0, "Generated 20250101-090000");
        assert!(cover.contains("type=\"ctrTitle\""));
        assert!(cover.contains("type=\"subTitle\""));
    }

    #[test]
    fn assembling_twice_yields_identical_slide_content() {
        let builder = missing_template_builder();
        let first = builder.assemble(&dubai_outline(), "20250101-090000").expect("first run");
        let second = builder.assemble(&dubai_outline(), "20250101-090000").expect("second run");

        for name in slide_part_names(&first) {
            assert_eq!(
                slide_runs(&read_part(&first, &name)),
                slide_runs(&read_part(&second, &name)),
                "slide content should be deterministic"
            );
        }
    }

    #[test]
    fn empty_bullet_list_still_produces_a_text_body() {
        let outline = Outline::new(vec![
            SlideContent { title: "Cover".into(), bullets: vec![] },
            SlideContent { title: "No bullets".into(), bullets: vec![] },
        ])
        .expect("non-empty outline");

        let deck = missing_template_builder()
            .assemble(&outline, "20250101-090000")
            .expect("assembly succeeds");
        let slide2 = read_part(&deck, "ppt/slides/slide2.xml");
        assert!(slide2.contains("<a:p/>"), "empty body keeps a single blank paragraph");
    }

    #[test]
    fn titles_are_xml_escaped() {
        let outline = Outline::new(vec![SlideContent {
            title: "Q&A <session>".into(),
            bullets: vec![],
        }])
        .expect("non-empty outline");

        let deck = missing_template_builder()
            .assemble(&outline, "20250101-090000")
            .expect("assembly succeeds");
        let cover = read_part(&deck, "ppt/slides/slide1.xml");
        assert!(cover.contains("Q&amp;A &lt;session&gt;"));
        assert_eq!(slide_runs(&cover)[0].0, "Q&A <session>");
    }

    #[test]
    fn own_output_is_a_usable_template() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let template_path = dir.path().join("template.pptx");

        let seeded = missing_template_builder()
            .assemble(&dubai_outline(), "20250101-090000")
            .expect("blank assembly succeeds");
        std::fs::write(&template_path, &seeded).expect("write template");

        let outline = outline_of(&["Cover", "Body"]);
        let from_template = DeckBuilder::new(&template_path)
            .assemble(&outline, "20250202-100000")
            .expect("template assembly succeeds");

        assert_eq!(slide_part_names(&from_template).len(), 2);
        assert_eq!(
            read_part(&from_template, "ppt/theme/theme1.xml"),
            read_part(&seeded, "ppt/theme/theme1.xml"),
            "theme should be carried over from the template"
        );
        // The template's own slides must not leak into the new deck.
        let cover = read_part(&from_template, "ppt/slides/slide1.xml");
        assert_eq!(slide_runs(&cover)[0].0, "Cover");
    }

    #[test]
    fn corrupt_template_is_a_fatal_error() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let template_path = dir.path().join("template.pptx");
        std::fs::write(&template_path, b"not a zip archive").expect("write garbage");

        let result = DeckBuilder::new(&template_path).assemble(&dubai_outline(), "20250101-090000");
        assert!(matches!(result, Err(DeckError::TemplateInvalid { .. })));
    }

    #[test]
    fn stamp_applies_fixed_offset() {
        // Offsets one hour apart must differ; exact value depends on now().
        let jst = generation_stamp(9);
        let utc = generation_stamp(0);
        assert_eq!(jst.len(), "20250101-090000".len());
        assert_eq!(utc.len(), jst.len());
    }
}
