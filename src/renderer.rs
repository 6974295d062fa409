//! Sale note PDF rendering with TRUE vector output via svg2pdf.

use crate::error::{ProcessError, Result};
use crate::model::{Customer, LineItem, Note, Product};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PAGE_WIDTH_PT: f32 = 595.0;
const PAGE_HEIGHT_PT: f32 = 842.0;
/// 1 cm margins, 10 mm line pitch.
const MARGIN_PT: f32 = 28.35;
const LINE_PITCH_PT: f32 = 28.35;
const HEADER_SIZE_PT: f32 = 14.0;
const BODY_SIZE_PT: f32 = 12.0;
/// Gap after the header and before the item list (5 mm).
const GAP_PT: f32 = 14.17;

const FONT_FAMILY: &str = "Arial, Helvetica, 'Liberation Sans', 'DejaVu Sans', sans-serif";

/// Family name of the fonts compiled into the binary.
const BUNDLED_FAMILY: &str = "DejaVu Sans";
const BUNDLED_FONTS: [&[u8]; 2] = [
    include_bytes!("../assets/fonts/DejaVuSans.ttf"),
    include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf"),
];

/// Header text printed at the top of every note.
pub const HEADER: &str = "Sale Note";

/// Text lines of a sale note, before any PDF encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleNoteLayout {
    pub header: String,
    pub folio_line: String,
    pub customer_line: String,
    pub item_lines: Vec<String>,
}

impl SaleNoteLayout {
    /// Builds the layout. `lines` pairs each item with its product, if found,
    /// and keeps the order it was given in.
    pub fn new(note: &Note, customer: &Customer, lines: &[(LineItem, Option<Product>)]) -> Self {
        let item_lines = lines
            .iter()
            .map(|(item, product)| {
                format!(
                    "- {} x {} (${})",
                    item.quantity,
                    Product::name_or_placeholder(product.as_ref()),
                    item.amount
                )
            })
            .collect();

        Self {
            header: HEADER.to_string(),
            folio_line: format!("Folio: {}", note.folio),
            customer_line: format!("Cliente: {}", customer.display_name),
            item_lines,
        }
    }

    /// All text lines in reading order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        [
            self.header.as_str(),
            self.folio_line.as_str(),
            self.customer_line.as_str(),
        ]
        .into_iter()
        .chain(self.item_lines.iter().map(String::as_str))
    }

    fn page_height(&self) -> f32 {
        let used = MARGIN_PT * 2.0
            + GAP_PT * 2.0
            + LINE_PITCH_PT * (3 + self.item_lines.len()) as f32;
        used.max(PAGE_HEIGHT_PT)
    }

    /// Emits the layout as an SVG document sized in PDF points.
    pub fn to_svg(&self) -> String {
        let height = self.page_height();
        let mut svg = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = PAGE_WIDTH_PT,
            h = height
        );
        let _ = writeln!(
            svg,
            r#"<rect x="0" y="0" width="{}" height="{}" fill="white"/>"#,
            PAGE_WIDTH_PT, height
        );

        let mut baseline = MARGIN_PT + LINE_PITCH_PT * 0.7;
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.2}" font-family="{}" font-size="{}" font-weight="bold" text-anchor="middle">{}</text>"#,
            PAGE_WIDTH_PT / 2.0,
            baseline,
            FONT_FAMILY,
            HEADER_SIZE_PT,
            escape_xml(&self.header)
        );
        baseline += LINE_PITCH_PT + GAP_PT;

        for line in [&self.folio_line, &self.customer_line] {
            push_body_line(&mut svg, baseline, line);
            baseline += LINE_PITCH_PT;
        }

        baseline += GAP_PT;
        for line in &self.item_lines {
            push_body_line(&mut svg, baseline, line);
            baseline += LINE_PITCH_PT;
        }

        svg.push_str("</svg>\n");
        svg
    }
}

fn push_body_line(svg: &mut String, baseline: f32, text: &str) {
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="{:.2}" font-family="{}" font-size="{}" xml:space="preserve">{}</text>"#,
        MARGIN_PT,
        baseline,
        FONT_FAMILY,
        BODY_SIZE_PT,
        escape_xml(text)
    );
}

/// Escapes markup and drops characters that XML 1.0 does not allow.
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

/// The `Char` production of XML 1.0.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r'
            | '\u{20}'..='\u{D7FF}'
            | '\u{E000}'..='\u{FFFD}'
            | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Counts text nodes that survived parsing. usvg silently drops text it
/// cannot resolve a font for.
fn count_text_nodes(group: &usvg::Group) -> usize {
    group
        .children()
        .iter()
        .map(|node| match node {
            usvg::Node::Text(_) => 1,
            usvg::Node::Group(child) => count_text_nodes(child),
            _ => 0,
        })
        .sum()
}

/// Renders sale notes to PDF.
///
/// Text is shaped with the fonts found on the system, an optional extra
/// font directory and the bundled DejaVu Sans faces, then converted to
/// vector outlines by svg2pdf.
pub struct SaleNoteRenderer {
    fontdb: Arc<usvg::fontdb::Database>,
}

impl SaleNoteRenderer {
    /// Creates a renderer using system and bundled fonts.
    pub fn new() -> Self {
        Self::with_font_dir(None)
    }

    /// Creates a renderer that also loads fonts from `font_dir`.
    pub fn with_font_dir(font_dir: Option<&Path>) -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        if let Some(dir) = font_dir {
            fontdb.load_fonts_dir(dir);
        }
        for data in BUNDLED_FONTS {
            fontdb.load_font_data(data.to_vec());
        }
        fontdb.set_sans_serif_family(BUNDLED_FAMILY);
        fontdb.set_serif_family(BUNDLED_FAMILY);

        Self::from_database(fontdb)
    }

    /// Creates a renderer over an already populated font database.
    pub fn from_database(fontdb: usvg::fontdb::Database) -> Self {
        if fontdb.is_empty() {
            warn!("No font faces loaded, every render will fail");
        } else {
            debug!("Loaded {} font faces", fontdb.len());
        }

        Self {
            fontdb: Arc::new(fontdb),
        }
    }

    /// Renders the note to PDF bytes.
    ///
    /// # Errors
    ///
    /// - SVG parsing errors (should not happen for generated layouts)
    /// - Invalid page dimensions
    /// - `MissingFonts` when some line could not be matched to a font face
    pub fn render(&self, layout: &SaleNoteLayout) -> Result<Vec<u8>> {
        let svg = layout.to_svg();

        let mut options = usvg::Options::default();
        options.fontdb = Arc::clone(&self.fontdb);

        let tree = usvg::Tree::from_str(&svg, &options)
            .map_err(|e| ProcessError::Render(format!("failed to parse SVG layout: {}", e)))?;

        let size = tree.size();
        if size.width() <= 0.0 || size.height() <= 0.0 {
            return Err(ProcessError::Render(format!(
                "invalid page dimensions: {}x{}",
                size.width(),
                size.height()
            )));
        }

        let expected = layout.lines().count();
        let rendered = count_text_nodes(tree.root());
        if rendered < expected {
            return Err(ProcessError::MissingFonts { expected, rendered });
        }

        let pdf_data = svg2pdf::to_pdf(
            &tree,
            svg2pdf::ConversionOptions::default(),
            svg2pdf::PageOptions::default(),
        );

        info!(
            "PDF render complete (VECTOR): {} bytes, {} item lines",
            pdf_data.len(),
            layout.item_lines.len()
        );
        Ok(pdf_data)
    }
}

impl Default for SaleNoteRenderer {
    fn default() -> Self {
        Self::new()
    }
}
