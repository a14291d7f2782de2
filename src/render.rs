use crate::config::Config;
use crate::event::CallbackAction;
use crate::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

const MIB: u64 = 1024 * 1024;

/// One row per category, then a single row of disk selectors with the
/// current disk checked.
pub fn category_keyboard(config: &Config, current_disk: usize) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = config
        .categories
        .iter()
        .map(|category| {
            vec![button(
                &category.label,
                CallbackAction::Download(category.key.clone()),
            )]
        })
        .collect();

    let disks = (0..config.disks.len())
        .map(|idx| {
            let label = if idx == current_disk {
                format!("✅ Disk {}", idx + 1)
            } else {
                format!("💾 D{}", idx + 1)
            };
            button(&label, CallbackAction::SetDisk(idx))
        })
        .collect();
    rows.push(disks);

    InlineKeyboardMarkup {
        inline_keyboard: rows,
    }
}

fn button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton {
        text: text.to_string(),
        callback_data: action.encode(),
    }
}

/// Drops the characters that open or close legacy Markdown entities.
pub fn strip_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '`' | '_' | '*'))
        .collect()
}

pub fn megabytes(bytes: u64) -> String {
    if bytes % MIB == 0 {
        return format!("{}", bytes / MIB);
    }
    format!("{:.1}", bytes as f64 / MIB as f64)
}
