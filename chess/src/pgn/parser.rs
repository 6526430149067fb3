use std::collections::BTreeMap;
use std::io::BufRead;

/// A parsed PGN game: tag pairs and main-line SAN tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    pub tags: BTreeMap<String, String>,
    pub moves: Vec<String>,
    pub result: GameResult,
}

impl PgnGame {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Custom starting position from the `FEN` tag, if any.
    pub fn start_fen(&self) -> Option<&str> {
        self.tag("FEN").filter(|f| !f.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
    #[default]
    Ongoing,
}

impl GameResult {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1-0" => Some(Self::WhiteWins),
            "0-1" => Some(Self::BlackWins),
            "1/2-1/2" => Some(Self::Draw),
            "*" => Some(Self::Ongoing),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
            Self::Ongoing => "*",
        }
    }
}

/// Parse a single PGN game.
pub fn parse_pgn(input: &str) -> Result<PgnGame, PgnError> {
    let mut game = PgnGame::default();
    let mut movetext = String::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && movetext.trim().is_empty() {
            let (name, value) = parse_tag(trimmed)?;
            game.tags.insert(name, value);
        } else {
            movetext.push_str(line);
            movetext.push('\n');
        }
    }

    if game.tags.is_empty() && movetext.trim().is_empty() {
        return Err(PgnError::InvalidFormat);
    }

    let (moves, result) = tokenize_movetext(&movetext)?;
    game.moves = moves;
    game.result = result
        .or_else(|| game.tag("Result").and_then(GameResult::from_token))
        .unwrap_or_default();
    Ok(game)
}

/// Parse `[Name "Value"]`.
fn parse_tag(line: &str) -> Result<(String, String), PgnError> {
    let invalid = || PgnError::InvalidTag(line.to_string());
    let inner = line
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(invalid)?
        .trim();
    let (name, rest) = inner.split_once(char::is_whitespace).ok_or_else(invalid)?;
    let value = rest
        .trim()
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or_else(invalid)?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }
    Ok((name.to_string(), value.replace("\\\"", "\"").replace("\\\\", "\\")))
}

/// Extract main-line move tokens. Comments, variations, NAGs and move
/// numbers are dropped; a result token ends the game.
fn tokenize_movetext(text: &str) -> Result<(Vec<String>, Option<GameResult>), PgnError> {
    let mut moves = Vec::new();
    let mut token = String::new();
    let mut variation_depth = 0usize;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        let delimiter = c.is_whitespace() || matches!(c, '{' | ';' | '(' | ')');
        if delimiter && !token.is_empty() {
            if let Some(result) = take_token(&mut token, &mut moves) {
                return Ok((moves, Some(result)));
            }
        }
        match c {
            '{' => {
                if !chars.by_ref().any(|c| c == '}') {
                    return Err(PgnError::UnterminatedComment);
                }
            }
            ';' => {
                chars.by_ref().find(|c| *c == '\n');
            }
            '(' => variation_depth += 1,
            ')' => variation_depth = variation_depth.saturating_sub(1),
            _ if delimiter || variation_depth > 0 => {}
            c => token.push(c),
        }
    }

    let result = if token.is_empty() {
        None
    } else {
        take_token(&mut token, &mut moves)
    };
    Ok((moves, result))
}

/// Move a finished token into `moves`, unless it is a move number, a NAG or
/// a result (which is returned instead).
fn take_token(token: &mut String, moves: &mut Vec<String>) -> Option<GameResult> {
    let word = std::mem::take(token);
    if let Some(result) = GameResult::from_token(&word) {
        return Some(result);
    }
    // "12." / "12..." / "12...e5" / "1.e4"
    let stripped = word.trim_start_matches(|c: char| c.is_ascii_digit());
    let san = if stripped.len() < word.len() && stripped.starts_with('.') {
        stripped.trim_start_matches('.')
    } else {
        word.as_str()
    };
    if !san.is_empty() && !san.starts_with('$') {
        moves.push(san.to_string());
    }
    None
}

/// Streams games out of a multi-game PGN source one at a time, so memory
/// stays bounded by the largest single game.
pub struct PgnReader<R> {
    reader: R,
    pending_tag: Option<String>,
    done: bool,
}

impl<R: BufRead> PgnReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending_tag: None,
            done: false,
        }
    }

    /// Collect the raw text of the next game. A game ends when a tag line
    /// follows movetext, or at end of input. Bytes that are not UTF-8
    /// (Latin-1 exports) are replaced rather than failing the stream.
    fn next_chunk(&mut self) -> std::io::Result<Option<String>> {
        let mut chunk = self.pending_tag.take().unwrap_or_default();
        let mut seen_movetext = false;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf)? == 0 {
                self.done = true;
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            let trimmed = line.trim();
            if trimmed.starts_with('[') && seen_movetext {
                self.pending_tag = Some(line.into_owned());
                break;
            }
            if !trimmed.is_empty() && !trimmed.starts_with('[') {
                seen_movetext = true;
            }
            chunk.push_str(&line);
        }

        Ok((!chunk.trim().is_empty()).then_some(chunk))
    }
}

impl<R: BufRead> Iterator for PgnReader<R> {
    type Item = Result<PgnGame, PgnError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.pending_tag.is_none() {
            return None;
        }
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(parse_pgn(&chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                self.pending_tag = None;
                Some(Err(PgnError::Io(e.to_string())))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PgnError {
    #[error("Invalid PGN format")]
    InvalidFormat,
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Unterminated comment")]
    UnterminatedComment,
    #[error("IO error: {0}")]
    Io(String),
}
