//! Single-page certificate PDF
//!
//! Writes a minimal PDF 1.4 file directly: one landscape Letter page, two
//! base-14 Helvetica fonts in WinAnsi encoding, a border and centred lines of
//! text. Base-14 fonts need no embedding, which keeps the output a few
//! kilobytes.

use chrono::{DateTime, Utc};

const PAGE_WIDTH: f32 = 792.0;
const PAGE_HEIGHT: f32 = 612.0;
const MARGIN: f32 = 48.0;

/// Average Helvetica glyph width as a fraction of the font size
const AVG_GLYPH_WIDTH: f32 = 0.52;

/// What goes on the certificate
#[derive(Debug, Clone)]
pub struct CertificateDocument {
    pub recipient_name: String,
    pub course_title: String,
    pub certificate_code: String,
    pub issued_at: DateTime<Utc>,
    pub organization_name: String,
    pub verification_url: Option<String>,
}

#[derive(Clone, Copy)]
enum Font {
    Bold,
    Regular,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Bold => "F1",
            Font::Regular => "F2",
        }
    }
}

/// WinAnsi code for `c`, when the encoding has one
fn win_ansi_byte(c: char) -> Option<u8> {
    let byte = match c {
        ' '..='~' | '\u{A0}'..='\u{FF}' => c as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => return None,
    };
    Some(byte)
}

/// Base letter for accented Latin letters WinAnsi lacks (Yoruba dot-below
/// vowels, Akan open vowels, Latin Extended-A)
fn fold_to_base(c: char) -> Option<char> {
    let lower = c.to_lowercase().next()?;
    let base = match lower {
        'ā' | 'ă' | 'ą' | 'ǎ' | 'ạ' | 'ả' => 'a',
        'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' | 'ɗ' => 'd',
        'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' | 'ẹ' | 'ẻ' | 'ẽ' | 'ɛ' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' | 'ǐ' | 'ị' => 'i',
        'ķ' | 'ƙ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ł' => 'l',
        'ḿ' => 'm',
        'ń' | 'ņ' | 'ň' | 'ǹ' | 'ŋ' => 'n',
        'ō' | 'ŏ' | 'ő' | 'ǒ' | 'ọ' | 'ỏ' | 'ɔ' => 'o',
        'ŕ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'ṣ' => 's',
        'ţ' | 'ť' => 't',
        'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' | 'ǔ' | 'ụ' => 'u',
        'ŵ' => 'w',
        'ŷ' | 'ỳ' | 'ƴ' => 'y',
        'ź' | 'ż' => 'z',
        _ => return None,
    };

    Some(if c.is_uppercase() { base.to_ascii_uppercase() } else { base })
}

fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}')
}

/// Escapes a string for a PDF literal in WinAnsi
///
/// Bytes above ASCII are written as octal escapes. Letters with no WinAnsi
/// code fall back to their base letter, combining tone marks are dropped and
/// anything else becomes `?`.
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars().filter(|&c| !is_combining_mark(c)) {
        let byte = win_ansi_byte(c)
            .or_else(|| fold_to_base(c).and_then(win_ansi_byte))
            .unwrap_or(b'?');

        match byte {
            b'\\' => escaped.push_str("\\\\"),
            b'(' => escaped.push_str("\\("),
            b')' => escaped.push_str("\\)"),
            0x20..=0x7E => escaped.push(char::from(byte)),
            _ => escaped.push_str(&format!("\\{:03o}", byte)),
        }
    }
    escaped
}

fn centered_line(content: &mut String, font: Font, size: f32, y: f32, text: &str) {
    let width = text.chars().count() as f32 * size * AVG_GLYPH_WIDTH;
    let x = ((PAGE_WIDTH - width) / 2.0).max(MARGIN);

    content.push_str(&format!(
        "BT /{} {:.0} Tf {:.1} {:.1} Td ({}) Tj ET\n",
        font.resource(),
        size,
        x,
        y,
        escape_text(text)
    ));
}

fn page_content(doc: &CertificateDocument) -> String {
    let mut content = String::new();

    // Double border
    content.push_str("0.16 0.29 0.48 RG 4 w 24 24 744 564 re S\n");
    content.push_str("1 w 36 36 720 540 re S\n");
    content.push_str("0.1 0.1 0.1 rg\n");

    centered_line(&mut content, Font::Regular, 16.0, 520.0, &doc.organization_name);
    centered_line(&mut content, Font::Bold, 36.0, 450.0, "Certificate of Completion");
    centered_line(&mut content, Font::Regular, 14.0, 395.0, "This certifies that");
    centered_line(&mut content, Font::Bold, 28.0, 350.0, &doc.recipient_name);
    centered_line(&mut content, Font::Regular, 14.0, 305.0, "has successfully completed");
    centered_line(&mut content, Font::Bold, 22.0, 265.0, &doc.course_title);

    let issued = format!("Issued {}", doc.issued_at.format("%B %-d, %Y"));
    centered_line(&mut content, Font::Regular, 12.0, 180.0, &issued);

    let code = format!("Verification code: {}", doc.certificate_code);
    centered_line(&mut content, Font::Regular, 12.0, 158.0, &code);

    if let Some(url) = &doc.verification_url {
        centered_line(&mut content, Font::Regular, 10.0, 138.0, url);
    }

    content
}

/// Renders the certificate as PDF bytes
pub fn render_certificate_pdf(doc: &CertificateDocument) -> Vec<u8> {
    let content = page_content(doc);

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.0} {:.0}] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R /F2 6 0 R >> >> >>",
            PAGE_WIDTH, PAGE_HEIGHT
        ),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        format!(
            "<< /Title ({}) /Producer (Kindred) >>",
            escape_text(&format!("Certificate {}", doc.certificate_code))
        ),
    ];

    let mut out: Vec<u8> = Vec::with_capacity(4096);
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }

    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            objects.len(),
            xref_start
        )
        .as_bytes(),
    );

    out
}
