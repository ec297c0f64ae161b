pub mod product;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::record::BookRecord;

static PRODUCT_POD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.product_pod").unwrap());
static BODY_ELEMENT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body *").unwrap());

/// The page came back but does not have the catalog markup shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedPage {
    #[error("document has no HTML elements")]
    NotHtml,

    #[error("product #{position} has no {field}")]
    MissingField {
        position: usize,
        field: &'static str,
    },

    #[error("product #{position} has unknown rating token {token:?}")]
    UnknownRating { position: usize, token: String },
}

/// A parsed catalog page.
pub struct CatalogDocument {
    html: Html,
}

impl CatalogDocument {
    pub fn parse(raw: &str) -> Result<Self, MalformedPage> {
        let html = Html::parse_document(raw);
        if html.select(&BODY_ELEMENT).next().is_none() {
            return Err(MalformedPage::NotHtml);
        }
        Ok(Self { html })
    }

    pub fn container_count(&self) -> usize {
        self.html.select(&PRODUCT_POD).count()
    }

    /// Records in document order, produced as the iterator is pulled.
    pub fn records(&self) -> impl Iterator<Item = Result<BookRecord, MalformedPage>> + '_ {
        self.html
            .select(&PRODUCT_POD)
            .enumerate()
            .map(|(i, pod)| product::extract(i + 1, pod))
    }
}

/// Parse one page and collect its records, failing on the first malformed container.
pub fn extract_records(raw: &str) -> Result<Vec<BookRecord>, MalformedPage> {
    let doc = CatalogDocument::parse(raw)?;
    debug!("{} product containers", doc.container_count());
    doc.records().collect()
}

/// Minimal catalog markup for tests: one `product_pod` per title, ratings cycling One..Five.
#[cfg(test)]
pub(crate) fn catalog_page(titles: &[&str]) -> String {
    use crate::record::Rating;

    let pods: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                r#"<li><article class="product_pod">
  <p class="star-rating {rating}"><i class="icon-star"></i></p>
  <h3><a href="book_{i}/index.html" title="{title}">{title}</a></h3>
  <div class="product_price"><p class="price_color">£{i}.99</p></div>
</article></li>
"#,
                rating = Rating::ALL[i % 5],
            )
        })
        .collect();
    format!(
        "<!DOCTYPE html><html><head><title>All products</title></head>\
         <body><section><ol class=\"row\">{}</ol></section></body></html>",
        pods
    )
}
