//! The brace-delimited, comma-separated `.cfg` text dialects: `stages.cfg`,
//! `trophy.cfg`, and `characters.cfg`. All three share one lexer (`Token`)
//! and one preprocessing pipeline; each has its own line-oriented scanner
//! and emitter.

use fancy_regex::Regex;

use crate::error::Result;

/// A single lexed value: the dialect's key/value language has exactly three
/// kinds of token.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Token {
    String(String),
    Integer(i64),
    Decimal(f64),
}

impl Token {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Token::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Token::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Token::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

/// Splits a comma-separated value list into [`Token`]s, matching the
/// original character-by-character lexer exactly, quirks included: a comma
/// always ends a token, even an empty one (defaulting to `String`); a
/// leading `-` sets `Integer` only to be immediately knocked back down to
/// `String` by the same "not a digit" check that demotes any other
/// non-digit in an in-progress integer, so negative numbers tokenize as
/// `String`, not `Integer`; and `\` does not consume itself — it is
/// appended to the buffer like any other character, with only the escape
/// mechanism's effect being that the *next* character bypasses the
/// quote/comma handling that would otherwise end the token.
pub fn tokenize(text: &str) -> Vec<Token> {
    #[derive(Clone, Copy, PartialEq)]
    enum Kind {
        Unset,
        String,
        Integer,
        Decimal,
    }

    fn make_token(kind: Kind, buf: &str) -> Token {
        match kind {
            Kind::Integer => buf.parse::<i64>().map(Token::Integer).unwrap_or_else(|_| Token::String(buf.to_string())),
            Kind::Decimal => buf.parse::<f64>().map(Token::Decimal).unwrap_or_else(|_| Token::String(buf.to_string())),
            _ => Token::String(buf.to_string()),
        }
    }

    let mut tokens = Vec::new();
    let mut buf = String::new();
    let mut kind = Kind::Unset;
    let mut in_string = false;
    let mut escape = false;

    for c in text.chars() {
        if escape {
            buf.push(c);
            escape = false;
            continue;
        }
        if c == '\\' {
            escape = true;
        }
        if kind == Kind::String && c == '"' {
            in_string = false;
            continue;
        }
        if c == ',' && !in_string {
            let k = if kind == Kind::Unset { Kind::String } else { kind };
            tokens.push(make_token(k, &buf));
            kind = Kind::Unset;
            buf.clear();
            continue;
        }
        if kind == Kind::Integer && c == '.' {
            kind = Kind::Decimal;
        }
        if kind == Kind::Unset {
            if c == ' ' || c == '\t' {
                continue;
            }
            if c.is_ascii_digit() || c == '-' {
                kind = Kind::Integer;
            }
            if c == '"' {
                kind = Kind::String;
                in_string = true;
                continue;
            }
            if c.is_alphabetic() {
                kind = Kind::String;
            }
        }
        if kind == Kind::Integer && !c.is_ascii_digit() {
            kind = Kind::String;
        }
        buf.push(c);
    }
    if !buf.is_empty() || kind != Kind::Unset {
        tokens.push(make_token(kind, &buf));
    }
    tokens
}

/// Joins tokens back into a comma-separated value list. When
/// `strings_are_strings` is false (used for a handful of fields that store
/// bare identifiers), `Token::String` values are emitted unquoted.
pub fn join_tokens(tokens: &[Token], delimiter: &str, strings_are_strings: bool) -> String {
    let parts: Vec<String> = tokens
        .iter()
        .map(|t| match t {
            Token::String(s) if strings_are_strings => format!("\"{s}\""),
            Token::String(s) => s.clone(),
            Token::Integer(i) => i.to_string(),
            Token::Decimal(d) => d.to_string(),
        })
        .collect();
    parts.join(delimiter)
}

fn fix_line_endings(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_comments(s: &str) -> String {
    // Drop //-style and /* */-style comments that aren't inside a "..." string.
    let re = Regex::new(r#""(?:\\.|[^"\\])*"|//[^\n]*|/\*[\s\S]*?\*/"#).unwrap();
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for m in re.find_iter(s).flatten() {
        out.push_str(&s[last..m.start()]);
        let text = m.as_str();
        if text.starts_with('"') {
            out.push_str(text);
        }
        last = m.end();
    }
    out.push_str(&s[last..]);
    out
}

fn strip(s: &str) -> &str {
    s.trim_matches(|c: char| c == ' ' || c == '\t')
}

fn preprocess(text: &str) -> Vec<String> {
    let text = remove_comments(&fix_line_endings(text));
    text.split('\n').map(|l| strip(l).to_string()).collect()
}

fn split_to(line: &str, delim: char) -> &str {
    line.splitn(2, delim).nth(1).map(|s| s.trim()).unwrap_or("")
}

fn split_to_first_whitespace(line: &str) -> &str {
    line.splitn(2, |c: char| c == ' ' || c == '\t').nth(1).map(|s| s.trim()).unwrap_or("")
}

fn tok_name(rest: &str) -> String {
    tokenize(rest).first().map(tok_string).unwrap_or_default()
}

// ---------------------------------------------------------------------
// stages.cfg
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LevelRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Dialog {
    pub index: i64,
    pub text: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageDialog {
    pub index: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Credit {
    pub int1: i64,
    pub text: String,
    pub int2: i64,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stage {
    pub levels: Vec<LevelRef>,
    pub dialog: Vec<Dialog>,
    pub stage_dialog: Vec<StageDialog>,
    pub credits: Vec<Credit>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StageCfg {
    pub valid: bool,
    pub stages: Vec<Stage>,
    pub exclude_rand_stages: Vec<i64>,
    pub include_rand_levels: Vec<String>,
    pub tips: Vec<String>,
}

fn ints(tokens: &[Token]) -> Vec<i64> {
    tokens.iter().filter_map(Token::as_integer).collect()
}

fn tok_string(tok: &Token) -> String {
    tok.as_str().unwrap_or_default().to_string()
}

fn tok_integer(tok: &Token) -> i64 {
    tok.as_integer().unwrap_or_default()
}

/// Parses a `stages.cfg` document. A `Level`/`Dialog`/`StageDialog`/`Credit`
/// line whose token count doesn't match any of that directive's accepted
/// shapes invalidates the whole document — it returns immediately with a
/// fresh, `valid: false` config, discarding any stages already parsed.
pub fn parse_stage_cfg(text: &str) -> Result<StageCfg> {
    let mut cfg = StageCfg::default();
    let mut ctx = Stage::default();

    for line in preprocess(text) {
        if line.is_empty() || line == "{" {
            continue;
        }
        if line == "}" {
            cfg.stages.push(std::mem::take(&mut ctx));
        } else if line == "Stage" {
            ctx = Stage::default();
        } else if line.starts_with("Level") {
            let toks = tokenize(split_to(&line, ':'));
            match toks.len() {
                1 => ctx.levels.push(LevelRef { id: tok_string(&toks[0]), name: tok_string(&toks[0]) }),
                2 => ctx.levels.push(LevelRef { id: tok_string(&toks[0]), name: tok_string(&toks[1]) }),
                _ => return Ok(StageCfg::default()),
            }
        } else if line.starts_with("Dialog") {
            let toks = tokenize(split_to(&line, ':'));
            match toks.len() {
                2 => ctx.dialog.push(Dialog { index: tok_integer(&toks[0]), text: tok_string(&toks[1]), title: String::new() }),
                3 => ctx.dialog.push(Dialog { index: tok_integer(&toks[0]), text: tok_string(&toks[1]), title: tok_string(&toks[2]) }),
                _ => return Ok(StageCfg::default()),
            }
        } else if line.starts_with("StageDialog") {
            let toks = tokenize(split_to(&line, ':'));
            if toks.len() != 2 {
                return Ok(StageCfg::default());
            }
            ctx.stage_dialog.push(StageDialog { index: tok_integer(&toks[0]), text: tok_string(&toks[1]) });
        } else if line.starts_with("Credit") {
            let toks = tokenize(split_to(&line, ':'));
            match toks.len() {
                2 => ctx.credits.push(Credit { int1: tok_integer(&toks[0]), text: tok_string(&toks[1]), int2: -1 }),
                3 => ctx.credits.push(Credit { int1: tok_integer(&toks[0]), text: tok_string(&toks[1]), int2: tok_integer(&toks[2]) }),
                _ => return Ok(StageCfg::default()),
            }
        } else if line.starts_with("ExcludeRandStages") {
            cfg.exclude_rand_stages = ints(&tokenize(split_to(&line, ':')));
        } else if line.starts_with("IncludeRandLevels") {
            cfg.include_rand_levels = tokenize(split_to(&line, ':')).iter().map(tok_string).collect();
        } else if line.starts_with("Tip") {
            if let Some(tip) = tokenize(split_to(&line, ':')).first() {
                cfg.tips.push(tok_string(tip));
            }
        }
    }

    cfg.valid = true;
    Ok(cfg)
}

/// Emits a `stages.cfg` document.
pub fn emit_stage_cfg(cfg: &StageCfg) -> String {
    if !cfg.valid {
        return String::new();
    }
    let mut out = String::new();
    for stage in &cfg.stages {
        out.push_str("Stage\n{\n");
        for l in &stage.levels {
            out.push_str(&format!("\tLevel: {}, \"{}\"\n", l.id, l.name));
        }
        for d in &stage.dialog {
            if d.title.is_empty() {
                out.push_str(&format!("\tDialog: {}, \"{}\"\n", d.index, d.text));
            } else {
                out.push_str(&format!("\tDialog: {}, \"{}\", \"{}\"\n", d.index, d.text, d.title));
            }
        }
        for sd in &stage.stage_dialog {
            out.push_str(&format!("\tStageDialog: {}\n", join_tokens(&[Token::Integer(sd.index), Token::String(sd.text.clone())], ", ", true)));
        }
        for c in &stage.credits {
            let mut toks = vec![Token::Integer(c.int1), Token::String(c.text.clone())];
            if c.int2 >= 0 {
                toks.push(Token::Integer(c.int2));
            }
            out.push_str(&format!("\tCredit: {}\n", join_tokens(&toks, ", ", true)));
        }
        out.push_str("}\n\n");
    }
    let exclude = cfg.exclude_rand_stages.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    out.push_str(&format!("ExcludeRandStages: {exclude}\n"));
    let include = cfg.include_rand_levels.join(", ");
    out.push_str(&format!("IncludeRandLevels: {include}\n\n"));
    for tip in &cfg.tips {
        out.push_str(&format!("Tip: \"{tip}\"\n"));
    }
    out
}

// ---------------------------------------------------------------------
// trophy.cfg
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Trophy {
    pub name: String,
    pub id: i64,
    pub etc: Vec<(String, Vec<Token>)>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Page {
    pub name: String,
    pub desc: String,
    pub small_desc: String,
    pub trophies: Vec<Trophy>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrophyCfg {
    pub valid: bool,
    pub pages: Vec<Page>,
}

/// Parses a `trophy.cfg` document.
pub fn parse_trophy_cfg(text: &str) -> Result<TrophyCfg> {
    let mut cfg = TrophyCfg { valid: true, ..Default::default() };
    let mut page_ctx: Option<Page> = None;
    let mut trophy_ctx: Option<Trophy> = None;

    for line in preprocess(text) {
        if line.is_empty() {
            continue;
        }
        if line == "}" {
            if let Some(trophy) = trophy_ctx.take() {
                if let Some(page) = page_ctx.as_mut() {
                    page.trophies.push(trophy);
                }
            } else if let Some(page) = page_ctx.take() {
                cfg.pages.push(page);
            }
            continue;
        }
        if let Some(trophy) = trophy_ctx.as_mut() {
            if line.starts_with("Id") {
                if let Some(Token::Integer(id)) = tokenize(split_to(&line, ':')).into_iter().next() {
                    trophy.id = id;
                }
            } else if let Some(idx) = line.find(':') {
                let key = line[..idx].trim().to_string();
                trophy.etc.push((key, tokenize(split_to(&line, ':'))));
            }
            continue;
        }
        if let Some(page) = page_ctx.as_mut() {
            if line.starts_with("Trophy") {
                let name = tok_name(split_to_first_whitespace(&line));
                trophy_ctx = Some(Trophy { name, ..Default::default() });
            } else if line.starts_with("Desc") {
                if let Some(Token::String(d)) = tokenize(split_to(&line, ':')).into_iter().next() {
                    page.desc = d;
                }
            } else if line.starts_with("SmallDesc") {
                if let Some(Token::String(d)) = tokenize(split_to(&line, ':')).into_iter().next() {
                    page.small_desc = d;
                }
            }
            continue;
        }
        if line.starts_with("Page") {
            let name = tok_name(split_to_first_whitespace(&line));
            page_ctx = Some(Page { name, ..Default::default() });
        }
    }
    Ok(cfg)
}

/// Emits a `trophy.cfg` document.
pub fn emit_trophy_cfg(cfg: &TrophyCfg) -> String {
    if !cfg.valid {
        return String::new();
    }
    let mut out = String::new();
    for page in &cfg.pages {
        out.push_str(&format!("Page \"{}\"\n{{\n", page.name));
        out.push_str(&format!("\tDesc: \"{}\"\n", page.desc));
        if !page.small_desc.is_empty() {
            out.push_str(&format!("\tSmallDesc: \"{}\"\n", page.small_desc));
        }
        for trophy in &page.trophies {
            out.push_str(&format!("\tTrophy \"{}\"\n\t{{\n", trophy.name));
            out.push_str(&format!("\t\tId: {}\n", trophy.id));
            for (key, toks) in &trophy.etc {
                out.push_str(&format!("\t\t{}: {}\n", key, join_tokens(toks, ",", true)));
            }
            out.push_str("\t}\n");
        }
        out.push_str("}\n\n");
    }
    out
}

// ---------------------------------------------------------------------
// characters.cfg
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Character {
    pub name: String,
    pub powerup: String,
    pub desc: String,
    pub tips: Vec<String>,
    pub etc: Vec<(String, Vec<Token>)>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CharacterCfg {
    pub valid: bool,
    pub characters: Vec<Character>,
}

/// Parses a `characters.cfg` document.
pub fn parse_character_cfg(text: &str) -> Result<CharacterCfg> {
    let mut cfg = CharacterCfg { valid: true, ..Default::default() };
    let mut ctx: Option<Character> = None;

    for line in preprocess(text) {
        if line.is_empty() {
            continue;
        }
        if line == "}" {
            if let Some(character) = ctx.take() {
                cfg.characters.push(character);
            }
            continue;
        }
        if line.starts_with("Character") {
            let name = tok_name(split_to(&line, ' '));
            ctx = Some(Character { name, ..Default::default() });
            continue;
        }
        if let Some(character) = ctx.as_mut() {
            if line.starts_with("Powerup") {
                if let Some(Token::String(p)) = tokenize(split_to(&line, ':')).into_iter().next() {
                    character.powerup = p;
                }
            } else if line.starts_with("Desc") {
                if let Some(Token::String(d)) = tokenize(split_to(&line, ':')).into_iter().next() {
                    character.desc = d;
                }
            } else if line.starts_with("Tip") {
                if let Some(Token::String(t)) = tokenize(split_to(&line, ':')).into_iter().next() {
                    character.tips.push(t);
                }
            } else if let Some(idx) = line.find(':') {
                let key = line[..idx].trim().to_string();
                character.etc.push((key, tokenize(split_to(&line, ':'))));
            }
        }
    }
    Ok(cfg)
}

/// Emits a `characters.cfg` document.
pub fn emit_character_cfg(cfg: &CharacterCfg) -> String {
    if !cfg.valid {
        return String::new();
    }
    let mut out = String::new();
    for character in &cfg.characters {
        out.push_str(&format!("Character \"{}\"\n{{\n", character.name));
        out.push_str(&format!("\tPowerup: {}\n", character.powerup));
        out.push_str(&format!("\tDesc: \"{}\"\n", character.desc));
        for tip in &character.tips {
            out.push_str(&format!("\tTip: \"{}\"\n", tip));
        }
        for (key, toks) in &character.etc {
            out.push_str(&format!("\t{}: {}\n", key, join_tokens(toks, ",", false)));
        }
        out.push_str("}\n\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_mixed_line() {
        let toks = tokenize(r#"1, 2.5, "hi, there""#);
        assert_eq!(toks, vec![Token::Integer(1), Token::Decimal(2.5), Token::String("hi, there".into())]);
    }

    /// A leading `-` sets `Integer`, but the very next check (any non-digit
    /// character demotes an in-progress `Integer` back to `String`) fires
    /// immediately since `-` itself isn't a digit — so negative numbers
    /// tokenize as `String`, never `Integer`. This is carried over from the
    /// original lexer as-is.
    #[test]
    fn tokenize_negative_number_is_a_string() {
        let toks = tokenize("-3");
        assert_eq!(toks, vec![Token::String("-3".into())]);
    }

    /// A comma always ends a token, even with nothing before it.
    #[test]
    fn tokenize_empty_field_between_commas() {
        let toks = tokenize("1,,2");
        assert_eq!(toks, vec![Token::Integer(1), Token::String(String::new()), Token::Integer(2)]);
    }

    /// `\` is not consumed — it lands in the token text, and only the
    /// character immediately after it skips quote/comma handling.
    #[test]
    fn tokenize_escaped_quote_keeps_backslash() {
        let toks = tokenize(r#""say \"hi\"""#);
        assert_eq!(toks, vec![Token::String("say \\\"hi\\\"".into())]);
    }

    #[test]
    fn stage_cfg_roundtrip_reparses() {
        let mut cfg = StageCfg { valid: true, ..Default::default() };
        cfg.stages.push(Stage {
            levels: vec![LevelRef { id: "1".into(), name: "level1".into() }],
            dialog: vec![],
            stage_dialog: vec![],
            credits: vec![],
        });
        cfg.tips.push("watch the rainbow peg".into());
        let text = emit_stage_cfg(&cfg);
        let reparsed = parse_stage_cfg(&text).unwrap();
        assert_eq!(reparsed.stages[0].levels[0].name, "level1");
        assert_eq!(reparsed.tips, cfg.tips);
    }

    #[test]
    fn stage_cfg_invalid_on_malformed_level_line() {
        let text = "Stage\n{\n\tLevel: 1, \"a\", \"b\", \"c\"\n}\n";
        let cfg = parse_stage_cfg(text).unwrap();
        assert!(!cfg.valid);
        assert!(cfg.stages.is_empty());
    }

    #[test]
    fn remove_comments_keeps_strings_intact() {
        let out = remove_comments("Desc: \"has // inside\" // real comment\n");
        assert!(out.contains("\"has // inside\""));
        assert!(!out.contains("real comment"));
    }

    #[test]
    fn trophy_etc_line_joins_without_spaces() {
        let cfg = TrophyCfg {
            valid: true,
            pages: vec![Page {
                name: "Main".into(),
                desc: "d".into(),
                small_desc: String::new(),
                trophies: vec![Trophy { name: "First Win".into(), id: 1, etc: vec![("Icon".into(), vec![Token::Integer(1), Token::Integer(2)])] }],
            }],
        };
        let text = emit_trophy_cfg(&cfg);
        assert!(text.contains("Icon: 1,2"));
        assert!(!text.contains("SmallDesc"));
    }

    #[test]
    fn character_etc_line_leaves_strings_unquoted() {
        let cfg = CharacterCfg {
            valid: true,
            characters: vec![Character {
                name: "Bjorn".into(),
                powerup: "MultiBall".into(),
                desc: "d".into(),
                tips: vec![],
                etc: vec![("Color".into(), vec![Token::String("Red".into())])],
            }],
        };
        let text = emit_character_cfg(&cfg);
        assert!(text.contains("Color: Red"));
        assert!(!text.contains("Color: \"Red\""));
    }

    #[test]
    fn trophy_cfg_roundtrip_reparses() {
        let cfg = TrophyCfg {
            valid: true,
            pages: vec![Page {
                name: "Main".into(),
                desc: "Trophies".into(),
                small_desc: "Small".into(),
                trophies: vec![Trophy { name: "First Win".into(), id: 1, etc: vec![] }],
            }],
        };
        let text = emit_trophy_cfg(&cfg);
        let reparsed = parse_trophy_cfg(&text).unwrap();
        assert_eq!(reparsed.pages[0].name, "Main");
        assert_eq!(reparsed.pages[0].trophies[0].name, "First Win");
        assert_eq!(reparsed.pages[0].trophies[0].id, 1);
    }
}
