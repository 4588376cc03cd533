#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub last_page: Option<u32>,
}

/// Parses a `Link` header of comma-separated `<url>; rel="name"` entries.
pub fn parse_link_header(value: &str) -> PageLinks {
    let mut links = PageLinks::default();
    for part in value.split(',') {
        let part = part.trim();
        let Some(url) = bracketed_url(part) else {
            continue;
        };
        if has_rel(part, "next") {
            links.next = Some(url.to_string());
        } else if has_rel(part, "last") {
            links.last_page = page_param(url);
        }
    }
    links
}

fn bracketed_url(part: &str) -> Option<&str> {
    let start = part.find('<')? + 1;
    let end = part[start..].find('>')? + start;
    Some(&part[start..end])
}

fn has_rel(part: &str, rel: &str) -> bool {
    part.split(';')
        .skip(1)
        .filter_map(|param| param.trim().strip_prefix("rel="))
        .any(|value| value.trim_matches('"').split_whitespace().any(|name| name == rel))
}

pub fn page_param(url: &str) -> Option<u32> {
    let query = url.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or("");
    for pair in query.split('&') {
        let mut iter = pair.splitn(2, '=');
        let key = iter.next().unwrap_or("");
        let value = iter.next().unwrap_or("");
        if key == "page"
            && let Ok(page) = value.parse::<u32>()
        {
            return Some(page);
        }
    }
    None
}
