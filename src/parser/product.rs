use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::MalformedPage;
use crate::record::{BookRecord, Rating};

static TITLE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3 > a").unwrap());
static PRICE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p.price_color").unwrap());
static STAR_RATING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p.star-rating").unwrap());

/// Pull one record out of an `article.product_pod`. `position` is 1-based, for error reports.
pub fn extract(position: usize, container: ElementRef<'_>) -> Result<BookRecord, MalformedPage> {
    let title = title(position, container)?;
    let price = price(position, container)?;
    let rating = rating(position, container)?;
    Ok(BookRecord::new(title, price, rating))
}

// The link text is truncated on the listing ("A Light in the ..."), the attribute is not.
fn title(position: usize, container: ElementRef<'_>) -> Result<String, MalformedPage> {
    container
        .select(&TITLE_LINK)
        .next()
        .and_then(|a| a.value().attr("title"))
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or(MalformedPage::MissingField {
            position,
            field: "title",
        })
}

fn price(position: usize, container: ElementRef<'_>) -> Result<String, MalformedPage> {
    container
        .select(&PRICE)
        .next()
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or(MalformedPage::MissingField {
            position,
            field: "price",
        })
}

fn rating(position: usize, container: ElementRef<'_>) -> Result<Rating, MalformedPage> {
    let token = container
        .select(&STAR_RATING)
        .next()
        .and_then(|p| p.value().attr("class"))
        .and_then(|class| class.split_whitespace().nth(1))
        .ok_or(MalformedPage::MissingField {
            position,
            field: "rating",
        })?;

    token
        .parse()
        .map_err(|token| MalformedPage::UnknownRating { position, token })
}
