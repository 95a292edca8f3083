//! User-facing strings (HTML), localized per [`Language`].
//!
//! `Both` renders the English text followed by the Chinese text.

use crate::{
    domain::{Language, QuoteSnapshot},
    formatting::{escape_html, signed},
    quota::Usage,
};

struct Text {
    en: &'static str,
    cn: &'static str,
}

fn pick(lang: Language, t: &Text) -> String {
    match lang {
        Language::English => t.en.to_string(),
        Language::Chinese => t.cn.to_string(),
        Language::Both => format!("{}\n\n{}", t.en, t.cn),
    }
}

fn pick_owned(lang: Language, en: String, cn: String) -> String {
    match lang {
        Language::English => en,
        Language::Chinese => cn,
        Language::Both => format!("{en}\n\n{cn}"),
    }
}

const WELCOME: Text = Text {
    en: "Welcome to <b>CBH AI Trading Assistant</b>!",
    cn: "欢迎使用 <b>CBH AI 交易助手</b>！",
};

const FEATURES: Text = Text {
    en: "<b>Core Features:</b>\n\
1️⃣ /analyze - Upload a chart for AI analysis.\n\
2️⃣ /price - Get a real-time price.\n\
3️⃣ /language - Set your language.\n\
4️⃣ /help - List commands.",
    cn: "<b>核心功能:</b>\n\
1️⃣ /analyze - 上传图表，获取专业AI分析。\n\
2️⃣ /price - 获取实时行情。\n\
3️⃣ /language - 切换语言。\n\
4️⃣ /help - 所有指令。",
};

const HELP: Text = Text {
    en: "📖 <b>How to use</b>\n\n\
• Send /analyze, then upload a chart screenshot (JPG/PNG). The AI returns direction, entry, stop loss and take profit.\n\
• Send /price and tap a symbol for a live quote, or type <code>/price SYMBOL</code>.\n\
• Each account can analyze a limited number of charts per day; check with /user.\n\
• /commands lists every command.",
    cn: "📖 <b>使用说明</b>\n\n\
• 发送 /analyze，然后上传图表截图（JPG/PNG），AI 将给出方向、入场、止损和止盈。\n\
• 发送 /price 并点击品种获取实时行情，或输入 <code>/price 代码</code>。\n\
• 每个账户每天可分析的图表数量有限，可用 /user 查询。\n\
• /commands 查看所有指令。",
};

/// Command list, identical in every language.
pub fn commands() -> String {
    "Available Commands:\n/start\n/help\n/commands\n/price\n/analyze\n/language\n/user".to_string()
}

pub fn welcome(lang: Language) -> String {
    format!("{}\n\n{}", pick(lang, &WELCOME), pick(lang, &FEATURES))
}

pub fn help(lang: Language) -> String {
    pick(lang, &HELP)
}

pub fn quote_menu(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "Choose a symbol to quote:",
            cn: "请选择您想查询的交易对:",
        },
    )
}

/// Button label for a quote symbol.
pub fn symbol_label(symbol: &str) -> String {
    match symbol {
        "XAUUSD" => "🥇 黄金 Gold (XAUUSD)".to_string(),
        "XAGUSD" => "🥈 白银 Silver (XAGUSD)".to_string(),
        "BTCUSD" => "₿ Bitcoin (BTCUSD)".to_string(),
        other => format!("📈 {other}"),
    }
}

pub fn quote_fetching(lang: Language, symbol: &str) -> String {
    let s = escape_html(symbol);
    pick_owned(
        lang,
        format!("Fetching {s}..."),
        format!("正在查询 {s}..."),
    )
}

pub fn quote(lang: Language, q: &QuoteSnapshot) -> String {
    let arrow = if q.change > 0.0 { "📈" } else { "📉" };
    let head = format!(
        "<b>{}</b> ({})",
        escape_html(&q.symbol),
        escape_html(&q.name)
    );
    let change = format!(
        "<code>{} ({}%)</code>",
        signed(q.change, 2),
        signed(q.change_percent, 2)
    );
    pick_owned(
        lang,
        format!("{head}\nPrice: <code>{}</code>\n{arrow} Change: {change}", q.price),
        format!("{head}\n当前价格: <code>{}</code>\n{arrow} 变化: {change}", q.price),
    )
}

pub fn quote_failed(lang: Language, kind: &str) -> String {
    let k = escape_html(kind);
    pick_owned(
        lang,
        format!("❌ Quote unavailable ({k}). Please try again later."),
        format!("❌ 行情查询失败（{k}），请稍后再试。"),
    )
}

pub fn quotes_unavailable(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "❌ Quotes are not available right now.",
            cn: "❌ 行情服务暂不可用。",
        },
    )
}

pub fn invalid_symbol(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "❌ Invalid symbol. Example: <code>/price XAUUSD</code>",
            cn: "❌ 无效的代码。例如：<code>/price XAUUSD</code>",
        },
    )
}

pub fn analyze_prompt(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "Please upload a chart image (JPG/PNG) now.",
            cn: "请现在上传图表图片（JPG/PNG）。",
        },
    )
}

pub fn analyzing(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "🧠 Analyzing, please wait...",
            cn: "🧠 分析中，请稍候...",
        },
    )
}

/// Fixed notice for a user who used up today's analyses.
pub fn quota_exceeded(lang: Language, limit: u32) -> String {
    pick_owned(
        lang,
        format!(
            "📌 You have reached today's upload limit ({limit} per day).\n🚀 Subscribe to Pro for unlimited chart analysis."
        ),
        format!("📌 今日上传次数已达上限（{limit}次/天）。\n🚀 订阅 Pro 版本可享受无限图表分析。"),
    )
}

pub fn analysis_unavailable(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "❌ Chart analysis is currently unavailable.",
            cn: "❌ 图表分析服务暂不可用。",
        },
    )
}

pub fn analysis_failed(lang: Language, kind: &str) -> String {
    let k = escape_html(kind);
    pick_owned(
        lang,
        format!("❌ Image analysis failed ({k}). Please try again later."),
        format!("❌ 图像分析失败（{k}），请稍后再试。"),
    )
}

pub fn language_menu(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "Please select your preferred language:",
            cn: "请选择您的语言:",
        },
    )
}

pub fn language_set(lang: Language) -> String {
    let code = lang.code();
    pick_owned(
        lang,
        format!("Language set to: {code}"),
        format!("语言设置为: {code}"),
    )
}

pub fn usage(lang: Language, u: Usage) -> String {
    pick_owned(
        lang,
        format!(
            "📊 Chart analyses used today: {}\n📌 Remaining: {}",
            u.used, u.remaining
        ),
        format!("📊 今日已使用图像分析：{} 次\n📌 剩余次数：{} 次", u.used, u.remaining),
    )
}

pub fn usage_unavailable(lang: Language) -> String {
    pick(
        lang,
        &Text {
            en: "❌ Usage information is not available right now.",
            cn: "❌ 暂时无法查询使用次数。",
        },
    )
}

pub fn unknown_command(lang: Language, name: &str) -> String {
    let n = escape_html(name);
    pick_owned(
        lang,
        format!("Unknown command: /{n}. Send /help for the list of commands."),
        format!("未知指令：/{n}。发送 /help 查看所有指令。"),
    )
}
