use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use nutrisnap_core::models::{ChatTurn, DailySummary, FoodEntry, TIMESTAMP_FORMAT};

pub(crate) fn print_entries_table(entries: &[FoodEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Logged")]
        logged: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "Carbs g")]
        carbs: String,
        #[tabled(rename = "Protein g")]
        proteins: String,
        #[tabled(rename = "Fat g")]
        fats: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| EntryRow {
            idx: i + 1,
            logged: e.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            name: truncate(&e.name, 35),
            calories: e.calories.map_or("-".into(), |v| format!("{v:.0}")),
            carbs: fmt_grams(e.carbs),
            proteins: fmt_grams(e.proteins),
            fats: fmt_grams(e.fats),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_totals(summary: &DailySummary) {
    println!(
        "  TOTAL: {:.0} kcal | C:{:.1}g P:{:.1}g F:{:.1}g",
        summary.total_calories, summary.total_carbs, summary.total_proteins, summary.total_fats
    );
}

pub(crate) fn print_turn(turn: &ChatTurn) {
    println!("you> {}", turn.user_message);
    println!("bot> {}", turn.bot_reply);
}

fn fmt_grams(v: Option<f64>) -> String {
    v.map_or("-".into(), |v| format!("{v:.1}"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
