//! Typed view of the free-form command records found in scene scripts.
//!
//! ```text
//! pcm NAME                      bgm TRACK NAME ...
//! se CHANNEL [NAME [LOOPS]]     next NAME
//! bg|eg|fg [SLOT [NAME [X [Y]]]]
//! cg|fw [SLOT [BASE,P1,_,P2,P3 [X [Y]]]]
//! fade CLASS SLOT FRAMES FROM TO
//! move CLASS SLOT FRAMES X Y
//! blend CLASS SLOT ALPHA
//! choice TARGET PROMPT...
//! if (CONDITION) COMMAND
//! #EXPRESSION
//! ```

use crate::image::ImageClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pcm(String),
    Music {
        track: u32,
        name: String,
    },
    /// `name == None` stops the channel.
    Effect {
        channel: usize,
        name: Option<String>,
        loops: i32,
    },
    ClearClass(ImageClass),
    ClearSlot(ImageClass, usize),
    /// Offsets stay unevaluated: they may reference script variables.
    BindImage {
        class: ImageClass,
        slot: usize,
        asset: String,
        x: String,
        y: String,
    },
    Fade {
        class: ImageClass,
        slot: usize,
        frames: u32,
        from: u8,
        to: u8,
    },
    Move {
        class: ImageClass,
        slot: usize,
        frames: u32,
        x: i32,
        y: i32,
    },
    Blend {
        class: ImageClass,
        slot: usize,
        alpha: u8,
    },
    Next(String),
    Choice {
        target: String,
        prompt: String,
    },
    If {
        condition: String,
        then: Box<Command>,
    },
    Eval(String),
}

type VerbParser = fn(&str) -> Option<Command>;

/// Ordered verb table; the first entry whose verb matches wins.
const VERBS: &[(&str, VerbParser)] = &[
    ("pcm", parse_pcm),
    ("bgm", parse_bgm),
    ("se", parse_se),
    ("bg", parse_bg),
    ("eg", parse_eg),
    ("fg", parse_fg),
    ("cg", parse_cg),
    ("fw", parse_fw),
    ("fade", parse_fade),
    ("move", parse_move),
    ("blend", parse_blend),
    ("next", parse_next),
    ("choice", parse_choice),
    ("if", parse_if),
];

impl Command {
    /// Returns `None` for anything unrecognized or malformed.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.starts_with('#') {
            return Some(Command::Eval(line.to_string()));
        }

        let verb_end = line
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(line.len());
        let (verb, rest) = line.split_at(verb_end);
        let (_, parse) = VERBS.iter().find(|(name, _)| *name == verb)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) && verb != "if" {
            return None;
        }
        parse(rest.trim())
    }
}

fn args(rest: &str) -> Vec<&str> {
    rest.split_whitespace().collect()
}

fn parse_pcm(rest: &str) -> Option<Command> {
    let name = args(rest).first()?.to_string();
    Some(Command::Pcm(name))
}

fn parse_bgm(rest: &str) -> Option<Command> {
    let args = args(rest);
    Some(Command::Music {
        track: args.first()?.parse().ok()?,
        name: args.get(1)?.to_string(),
    })
}

fn parse_se(rest: &str) -> Option<Command> {
    let args = args(rest);
    let channel = args.first()?.parse().ok()?;
    let loops = match args.get(2) {
        Some(loops) => loops.parse().ok()?,
        None => 0,
    };
    Some(Command::Effect {
        channel,
        name: args.get(1).map(|name| name.to_string()),
        loops,
    })
}

fn parse_image(class: ImageClass, rest: &str) -> Option<Command> {
    let args = args(rest);
    let Some(slot) = args.first() else {
        return Some(Command::ClearClass(class));
    };
    let slot = slot.parse().ok()?;
    let Some(asset) = args.get(1) else {
        return Some(Command::ClearSlot(class, slot));
    };
    let offset = |index: usize| args.get(index).map_or_else(|| "0".to_string(), |arg| arg.to_string());
    Some(Command::BindImage {
        class,
        slot,
        asset: asset.to_string(),
        x: offset(2),
        y: offset(3),
    })
}

fn parse_bg(rest: &str) -> Option<Command> {
    parse_image(ImageClass::Bg, rest)
}

fn parse_eg(rest: &str) -> Option<Command> {
    parse_image(ImageClass::Eg, rest)
}

fn parse_fg(rest: &str) -> Option<Command> {
    parse_image(ImageClass::Fg, rest)
}

fn parse_cg(rest: &str) -> Option<Command> {
    parse_image(ImageClass::Cg, rest)
}

fn parse_fw(rest: &str) -> Option<Command> {
    parse_image(ImageClass::Fw, rest)
}

/// `CLASS SLOT` prefix shared by the animation verbs.
fn target(args: &[&str]) -> Option<(ImageClass, usize)> {
    Some((ImageClass::from_key(args.first()?)?, args.get(1)?.parse().ok()?))
}

fn parse_fade(rest: &str) -> Option<Command> {
    let args = args(rest);
    let (class, slot) = target(&args)?;
    Some(Command::Fade {
        class,
        slot,
        frames: args.get(2)?.parse().ok()?,
        from: args.get(3)?.parse().ok()?,
        to: args.get(4)?.parse().ok()?,
    })
}

fn parse_move(rest: &str) -> Option<Command> {
    let args = args(rest);
    let (class, slot) = target(&args)?;
    Some(Command::Move {
        class,
        slot,
        frames: args.get(2)?.parse().ok()?,
        x: args.get(3)?.parse().ok()?,
        y: args.get(4)?.parse().ok()?,
    })
}

fn parse_blend(rest: &str) -> Option<Command> {
    let args = args(rest);
    let (class, slot) = target(&args)?;
    Some(Command::Blend {
        class,
        slot,
        alpha: args.get(2)?.parse().ok()?,
    })
}

fn parse_next(rest: &str) -> Option<Command> {
    Some(Command::Next(args(rest).first()?.to_string()))
}

fn parse_choice(rest: &str) -> Option<Command> {
    let (target, prompt) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if target.is_empty() {
        return None;
    }
    Some(Command::Choice {
        target: target.to_string(),
        prompt: prompt.trim().to_string(),
    })
}

/// `if (CONDITION) COMMAND`, with balanced parentheses inside the condition.
fn parse_if(rest: &str) -> Option<Command> {
    let body = rest.trim_start().strip_prefix('(')?;
    let mut depth = 1usize;
    let mut close = None;
    for (index, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(index);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    let condition = body[..close].trim();
    let then = body[close + 1..].trim();
    if condition.is_empty() || then.is_empty() {
        return None;
    }
    Some(Command::If {
        condition: condition.to_string(),
        then: Box::new(Command::parse(then)?),
    })
}

/// Expands a composite argument (`BASE,P1,_,P2,P3`) into its three part
/// names: `BASE_P1`, `BASE_` + P2 zero-padded to three digits and `BASE_` +
/// P3 zero-padded to four. Fewer than five fields is malformed.
pub fn composite_parts(asset: &str) -> Option<[String; 3]> {
    let fields: Vec<&str> = asset.split(',').collect();
    if fields.len() < 5 {
        return None;
    }
    let base = fields[0];
    Some([
        format!("{base}_{}", fields[1]),
        format!("{base}_{:0>3}", fields[3]),
        format!("{base}_{:0>4}", fields[4]),
    ])
}
