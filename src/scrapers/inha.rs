use crate::models::DetailMap;
use crate::scrapers::types::RawListingRow;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::debug;

/// Default host of the facility reservation pages
pub const INHA_BASE_URL: &str = "https://www.inha.ac.kr";

const PRINT_PATH: &str = "/facility/kr/facilityPrint.do";

/// Print page label -> canonical detail key.
/// Labels are compared with all whitespace removed.
const LABEL_KEYS: &[(&str, &str)] = &[
    ("장소", "place"),
    ("사용장소", "place"),
    ("행사명", "event"),
    ("신청부서", "department"),
    ("신청단체", "department"),
    ("부서", "department"),
    ("일시", "datetime_range"),
    ("사용일시", "datetime_range"),
    ("사용기간", "datetime_range"),
    ("승인여부", "approval"),
    ("승인상태", "approval"),
    ("신청자", "applicant"),
    ("연락처", "contact"),
    ("인원", "headcount"),
    ("사용인원", "headcount"),
    ("행사내용", "description"),
    ("비고", "note"),
];

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("static selector"))
}

fn table_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, "table")
}

fn body_row_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, "tbody > tr")
}

fn anchor_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, "a")
}

fn detail_table_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, r#"table[width="600px"], table[width="600"]"#)
}

fn tr_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, "tr")
}

fn th_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, "th")
}

fn td_selector() -> &'static Selector {
    static CELL: OnceLock<Selector> = OnceLock::new();
    selector(&CELL, "td")
}

fn print_call() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"jf_facilityPrint\('(\d+)',\s*'(\d+)'\)").expect("static regex")
    })
}

/// Canonical key for a print page label; unknown labels keep their text.
pub fn translate_label(label: &str) -> String {
    let compact: String = label.chars().filter(|c| !c.is_whitespace()).collect();
    LABEL_KEYS
        .iter()
        .find(|(known, _)| *known == compact)
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| label.trim().to_string())
}

/// Concatenated text of an element, each text node trimmed
fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// Text nodes joined by single spaces, line breaks flattened
fn flattened_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(|text| text.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extractor for the Inha University facility reservation pages
#[derive(Debug, Clone)]
pub struct InhaExtractor {
    base_url: String,
}

impl Default for InhaExtractor {
    fn default() -> Self {
        Self::new(INHA_BASE_URL)
    }
}

impl InhaExtractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Rows of the first table in the listing page.
    /// A page without a table yields no rows.
    pub fn extract_listing(&self, html: &str) -> Vec<RawListingRow> {
        let document = Html::parse_document(html);

        let Some(table) = document.select(table_selector()).next() else {
            debug!("No reservation table in listing page");
            return Vec::new();
        };

        let mut rows = Vec::new();
        for tr in table.select(body_row_selector()) {
            let cells: Vec<ElementRef<'_>> = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|el| el.value().name() == "td")
                .collect();

            let Some((action, leading)) = cells.split_last() else {
                continue;
            };

            // "No reservations" placeholder spanning the whole table
            if leading.is_empty() && action.value().attr("colspan").is_some() {
                debug!("Skipping placeholder row: {}", stripped_text(*action));
                continue;
            }

            rows.push(RawListingRow {
                fields: leading.iter().map(|cell| stripped_text(*cell)).collect(),
                detail_url: self.print_url(*action),
            });
        }

        debug!("Extracted {} listing rows", rows.len());
        rows
    }

    /// Label/value pairs of the print page's fixed-width table.
    pub fn extract_detail(&self, html: &str) -> DetailMap {
        let document = Html::parse_document(html);
        let mut details = DetailMap::new();

        let Some(table) = document.select(detail_table_selector()).next() else {
            debug!("No detail table in print page");
            return details;
        };

        for tr in table.select(tr_selector()) {
            let th = tr.select(th_selector()).next();
            let td = tr.select(td_selector()).next();
            if let (Some(th), Some(td)) = (th, td) {
                let label = stripped_text(th);
                if label.is_empty() {
                    continue;
                }
                details.insert(translate_label(&label), flattened_text(td));
            }
        }

        details
    }

    fn print_url(&self, cell: ElementRef<'_>) -> Option<String> {
        let anchor = cell.select(anchor_selector()).next()?;
        let attrs = ["href", "onclick"];

        attrs.iter().find_map(|name| {
            let value = anchor.value().attr(*name)?;
            let caps = print_call().captures(value)?;
            Some(format!(
                "{}{}?seq={}&req={}",
                self.base_url, PRINT_PATH, &caps[1], &caps[2]
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r##"
        <html><body>
        <table class="board">
          <thead><tr>
            <th>기간</th><th>장소</th><th>부서</th><th>행사</th><th>승인</th><th>출력</th>
          </tr></thead>
          <tbody>
            <tr>
              <td>20250601 ~ 20250601</td>
              <td> 1관 </td>
              <td>총학생회</td>
              <td>체육대회</td>
              <td>승인</td>
              <td><a href="javascript:jf_facilityPrint('12', '345');">출력</a></td>
            </tr>
            <tr>
              <td>20250602 ~ 20250603</td>
              <td>2관</td>
              <td>공과대학</td>
              <td>졸업 <b>설명회</b></td>
              <td>대기</td>
              <td><a href="#" onclick="jf_facilityPrint('13','346')">출력</a></td>
            </tr>
            <tr>
              <td>20250604 ~ 20250604</td>
              <td>3관</td>
              <td>학생처</td>
              <td>승인</td>
              <td></td>
            </tr>
          </tbody>
        </table>
        </body></html>
    "##;

    const PRINT_PAGE: &str = r#"
        <html><body>
        <table width="600px">
          <tr><th>장 소</th><td>1관</td></tr>
          <tr><th>사용일시</th><td>20250514 ~ 20250514
              09:00 ~ 12:00</td></tr>
          <tr><th>특이사항</th><td>  음향   장비 </td></tr>
          <tr><td>unpaired</td></tr>
          <tr><th></th><td>no label</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn extracts_rows_and_print_links() {
        let rows = InhaExtractor::default().extract_listing(LISTING);
        assert_eq!(rows.len(), 3);

        assert_eq!(
            rows[0].fields,
            vec!["20250601 ~ 20250601", "1관", "총학생회", "체육대회", "승인"]
        );
        assert_eq!(
            rows[0].detail_url.as_deref(),
            Some("https://www.inha.ac.kr/facility/kr/facilityPrint.do?seq=12&req=345")
        );

        assert_eq!(rows[1].fields[3], "졸업설명회");
        assert_eq!(
            rows[1].detail_url.as_deref(),
            Some("https://www.inha.ac.kr/facility/kr/facilityPrint.do?seq=13&req=346")
        );
    }

    #[test]
    fn short_row_is_kept_for_the_normalizer_to_reject() {
        let rows = InhaExtractor::default().extract_listing(LISTING);
        assert_eq!(rows[2].fields.len(), 4);
        assert_eq!(rows[2].detail_url, None);
    }

    #[test]
    fn missing_table_yields_no_rows() {
        let rows =
            InhaExtractor::default().extract_listing("<html><body><p>점검 중</p></body></html>");
        assert!(rows.is_empty());
    }

    #[test]
    fn placeholder_row_is_ignored() {
        let html = r#"<table><tbody>
            <tr><td colspan="6">예약 내역이 없습니다.</td></tr>
        </tbody></table>"#;
        assert!(InhaExtractor::default().extract_listing(html).is_empty());
    }

    #[test]
    fn custom_base_url_is_used() {
        let rows = InhaExtractor::new("http://localhost:8080/").extract_listing(LISTING);
        assert_eq!(
            rows[0].detail_url.as_deref(),
            Some("http://localhost:8080/facility/kr/facilityPrint.do?seq=12&req=345")
        );
    }

    #[test]
    fn extracts_detail_pairs() {
        let details = InhaExtractor::default().extract_detail(PRINT_PAGE);

        assert_eq!(details.get("place").unwrap(), "1관");
        assert_eq!(
            details.get("datetime_range").unwrap(),
            "20250514 ~ 20250514 09:00 ~ 12:00"
        );
        assert_eq!(details.get("특이사항").unwrap(), "음향 장비");
        assert_eq!(details.len(), 3);
    }

    #[test]
    fn missing_detail_table_is_empty() {
        let details = InhaExtractor::default()
            .extract_detail("<table><tr><th>장소</th><td>1관</td></tr></table>");
        assert!(details.is_empty());
    }

    #[test]
    fn unknown_labels_pass_through() {
        assert_eq!(translate_label(" 특이사항 "), "특이사항");
        assert_eq!(translate_label("행 사 명"), "event");
    }
}
