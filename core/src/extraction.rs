use std::sync::LazyLock;

use regex::Regex;

use crate::models::FoodItem;

static NUTRIENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(calories|carbs|carbohydrates|proteins?|fats?)\s*:\s*~?\s*([0-9]+(?:\.[0-9]+)?)")
        .unwrap()
});

/// Pull food items out of a free-text model analysis.
///
/// Items are lines like
/// `- Item: Apple - Calories: 95 kcal, Carbs: 25 g, Proteins: 0.5 g, Fats: 0.3 g`.
/// Nutrients may also sit on the lines after the item line. Anything that does
/// not fit is skipped, so the worst case is an empty list.
#[must_use]
pub fn parse_extraction_response(text: &str) -> Vec<FoodItem> {
    let mut items = Vec::new();
    let mut current: Option<FoodItem> = None;

    for line in text.lines() {
        let content = strip_list_marker(line);

        if let Some(rest) = strip_prefix_ignore_case(content, "item:") {
            if let Some(done) = current.take() {
                items.push(done);
            }
            let mut item = FoodItem::named(item_name(rest));
            apply_nutrients(&mut item, rest);
            current = Some(item);
            continue;
        }

        // Meal totals follow the item list; don't let them land on the last item.
        if content.to_lowercase().contains("total") {
            if let Some(done) = current.take() {
                items.push(done);
            }
            continue;
        }

        if let Some(item) = current.as_mut() {
            apply_nutrients(item, content);
        }
    }

    if let Some(done) = current {
        items.push(done);
    }
    items
}

fn strip_list_marker(line: &str) -> &str {
    line.trim_start()
        .trim_start_matches(['-', '*', '•'])
        .trim_start()
        .trim_start_matches('*')
        .trim_start()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &s[prefix.len()..])
}

fn item_name(rest: &str) -> String {
    let raw = rest.split(" - ").next().unwrap_or_default();
    let name = raw.trim_matches(|c: char| c == '*' || c.is_whitespace());
    if name.is_empty() {
        "Unknown".to_string()
    } else {
        name.to_string()
    }
}

fn apply_nutrients(item: &mut FoodItem, line: &str) {
    for caps in NUTRIENT_RE.captures_iter(line) {
        let Ok(value) = caps[2].parse::<f64>() else {
            continue;
        };
        let label = caps[1].to_lowercase();
        let slot = match label.as_str() {
            "calories" => &mut item.calories,
            "carbs" | "carbohydrates" => &mut item.carbs,
            "protein" | "proteins" => &mut item.proteins,
            "fat" | "fats" => &mut item.fats,
            _ => continue,
        };
        *slot = Some(value);
    }
}
