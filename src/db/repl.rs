//! Interactive command shell for the content store.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use serde_json::Value;

use super::api::{Database, DatabaseError, DatabaseResult};
use crate::model::{ContentBlock, NavigationItem, NavigationNode, NewContentBlock, NewNavigationItem};
use crate::ordering::ReorderEntry;
use crate::storage::RecordId;

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
    /// Entries shown by `log` without an explicit count.
    pub log_limit: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "cmsdb> ".into(),
            timing: false,
            log_limit: 10,
        }
    }
}

/// One parsed shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NavAdd {
        label: String,
        url: Option<String>,
        parent: Option<RecordId>,
        at: Option<i64>,
        inactive: bool,
    },
    NavMove {
        id: RecordId,
        parent: Option<RecordId>,
    },
    NavOrder {
        parent: Option<RecordId>,
        entries: Vec<ReorderEntry>,
    },
    NavDelete(RecordId),
    NavList(Option<RecordId>),
    NavTree,
    NavMenu,
    NavNormalize(Option<RecordId>),
    BlockAdd {
        page: RecordId,
        block_type: String,
        data: Value,
        at: Option<i64>,
    },
    BlockMove {
        id: RecordId,
        page: RecordId,
        at: Option<i64>,
    },
    BlockOrder {
        page: RecordId,
        entries: Vec<ReorderEntry>,
    },
    BlockDelete(RecordId),
    BlockList(RecordId),
    BlockNormalize(RecordId),
    Log(Option<usize>),
    Stats,
    Help,
    Exit,
}

impl Command {
    pub fn parse(line: &str) -> DatabaseResult<Self> {
        let words = split_words(line)?;
        let words: Vec<&str> = words.iter().map(String::as_str).collect();

        let command = match words.as_slice() {
            ["help" | "h" | "?"] => Command::Help,
            ["exit" | "quit" | "q"] => Command::Exit,
            ["stats"] => Command::Stats,
            ["log"] => Command::Log(None),
            ["log", n] => Command::Log(Some(n.parse().map_err(|_| invalid(format!("not a count: {}", n)))?)),

            ["nav", "add", label, rest @ ..] => {
                let mut flags = Flags::parse(rest)?;
                Command::NavAdd {
                    label: label.to_string(),
                    url: flags.take("--url"),
                    parent: flags.take("--parent").map(|p| record_id(&p)).transpose()?,
                    at: flags.take("--at").map(|n| order_index(&n)).transpose()?,
                    inactive: flags.switch("--inactive"),
                }
                .checked(flags)?
            }
            ["nav", "move", id, parent] => Command::NavMove {
                id: record_id(id)?,
                parent: parent_scope(parent)?,
            },
            ["nav", "order", parent, entries @ ..] if !entries.is_empty() => Command::NavOrder {
                parent: parent_scope(parent)?,
                entries: entries.iter().map(|e| reorder_entry(e, true)).collect::<DatabaseResult<_>>()?,
            },
            ["nav", "delete", id] => Command::NavDelete(record_id(id)?),
            ["nav", "list"] => Command::NavList(None),
            ["nav", "list", parent] => Command::NavList(parent_scope(parent)?),
            ["nav", "tree"] => Command::NavTree,
            ["nav", "menu"] => Command::NavMenu,
            ["nav", "normalize", parent] => Command::NavNormalize(parent_scope(parent)?),

            ["block", "add", page, block_type, rest @ ..] => {
                let (data, rest) = match rest {
                    [json, rest @ ..] if !json.starts_with("--") => (
                        serde_json::from_str(json).map_err(|e| invalid(format!("bad block data: {}", e)))?,
                        rest,
                    ),
                    _ => (Value::Object(Default::default()), rest),
                };
                let mut flags = Flags::parse(rest)?;
                Command::BlockAdd {
                    page: record_id(page)?,
                    block_type: block_type.to_string(),
                    data,
                    at: flags.take("--at").map(|n| order_index(&n)).transpose()?,
                }
                .checked(flags)?
            }
            ["block", "move", id, page, rest @ ..] => {
                let mut flags = Flags::parse(rest)?;
                Command::BlockMove {
                    id: record_id(id)?,
                    page: record_id(page)?,
                    at: flags.take("--at").map(|n| order_index(&n)).transpose()?,
                }
                .checked(flags)?
            }
            ["block", "order", page, entries @ ..] if !entries.is_empty() => Command::BlockOrder {
                page: record_id(page)?,
                entries: entries.iter().map(|e| reorder_entry(e, false)).collect::<DatabaseResult<_>>()?,
            },
            ["block", "delete", id] => Command::BlockDelete(record_id(id)?),
            ["block", "list", page] => Command::BlockList(record_id(page)?),
            ["block", "normalize", page] => Command::BlockNormalize(record_id(page)?),

            _ => return Err(invalid(format!("unknown command: {} (try `help`)", line.trim()))),
        };
        Ok(command)
    }

    fn checked(self, flags: Flags) -> DatabaseResult<Self> {
        match flags.leftover() {
            Some(flag) => Err(invalid(format!("unexpected argument: {}", flag))),
            None => Ok(self),
        }
    }
}

/// What the shell should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Exit,
}

/// The interactive shell.
pub struct Repl {
    db: Database,
    config: ReplConfig,
}

impl Repl {
    pub fn new(db: Database) -> Self {
        Self::with_config(db, ReplConfig::default())
    }

    pub fn with_config(db: Database, config: ReplConfig) -> Self {
        Self { db, config }
    }

    /// Run the REPL on stdin until `exit` or end of input.
    pub fn run(&mut self) -> DatabaseResult<()> {
        println!("cmsdb {} at {}", env!("CARGO_PKG_VERSION"), self.db.path().display());
        println!("Type `help` for commands.");
        println!();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("{}", self.config.prompt);
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                println!();
                break;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let start = std::time::Instant::now();
            match self.execute(line) {
                Ok(Outcome::Exit) => break,
                Ok(Outcome::Output(text)) => {
                    if !text.is_empty() {
                        println!("{}", text);
                    }
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Ok(())
    }

    /// Parse and run one command line.
    pub fn execute(&self, line: &str) -> DatabaseResult<Outcome> {
        let output = match Command::parse(line)? {
            Command::Exit => return Ok(Outcome::Exit),
            Command::Help => HELP.trim_end().to_string(),
            Command::Stats => self.db.stats()?.to_string(),
            Command::Log(limit) => {
                let commits = self.db.history(Some(limit.unwrap_or(self.config.log_limit)))?;
                let mut out = String::new();
                for commit in commits {
                    let _ = writeln!(
                        out,
                        "{} {} {}",
                        commit.id.short(),
                        commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        commit.summary()
                    );
                }
                out.trim_end().to_string()
            }

            Command::NavAdd {
                label,
                url,
                parent,
                at,
                inactive,
            } => {
                let mut input = NewNavigationItem::new(label);
                if let Some(url) = url {
                    input = input.url(url);
                }
                if let Some(parent) = parent {
                    input = input.parent(parent);
                }
                if let Some(at) = at {
                    input = input.order_index(at);
                }
                if inactive {
                    input = input.inactive();
                }
                nav_line(&self.db.navigation().create(input)?)
            }
            Command::NavMove { id, parent } => nav_line(&self.db.navigation().reparent(&id, parent.as_ref())?),
            Command::NavOrder { parent, entries } => {
                let written = self.db.navigation().reorder(parent.as_ref(), &entries)?;
                format!("{} item(s) reordered", written)
            }
            Command::NavDelete(id) => {
                self.db.navigation().delete(&id)?;
                format!("deleted {}", id)
            }
            Command::NavList(parent) => {
                let items = self.db.navigation().children(parent.as_ref())?;
                listing(items.iter().map(nav_line))
            }
            Command::NavTree => tree_lines(&self.db.navigation().tree()?),
            Command::NavMenu => tree_lines(&self.db.navigation().menu()?),
            Command::NavNormalize(parent) => {
                let written = self.db.navigation().normalize(parent.as_ref())?;
                format!("{} item(s) renumbered", written)
            }

            Command::BlockAdd {
                page,
                block_type,
                data,
                at,
            } => {
                let mut input = NewContentBlock::new(page, block_type).data(data);
                if let Some(at) = at {
                    input = input.order_index(at);
                }
                block_line(&self.db.content().create(input)?)
            }
            Command::BlockMove { id, page, at } => block_line(&self.db.content().relocate(&id, &page, at)?),
            Command::BlockOrder { page, entries } => {
                let written = self.db.content().reorder(&page, &entries)?;
                format!("{} block(s) reordered", written)
            }
            Command::BlockDelete(id) => {
                self.db.content().delete(&id)?;
                format!("deleted {}", id)
            }
            Command::BlockList(page) => {
                let blocks = self.db.content().for_page(&page)?;
                listing(blocks.iter().map(block_line))
            }
            Command::BlockNormalize(page) => {
                let written = self.db.content().normalize(&page)?;
                format!("{} block(s) renumbered", written)
            }
        };
        Ok(Outcome::Output(output))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

const HELP: &str = r#"
Navigation (PARENT is an item id or `root`):
  nav add LABEL [--url URL] [--parent ID] [--at N] [--inactive]
  nav move ID PARENT              Reparent an item, keeping its index
  nav order PARENT ID=N[@PARENT] ...
                                  Reorder siblings in one transaction
  nav delete ID                   Delete a leaf item
  nav list [PARENT]               Children of PARENT (default: root)
  nav tree                        Whole tree
  nav menu                        Active items only
  nav normalize PARENT            Renumber siblings 1..n

Content blocks:
  block add PAGE TYPE [JSON] [--at N]
  block move ID PAGE [--at N]     Move a block to another page
  block order PAGE ID=N ...       Reorder a page in one transaction
  block delete ID
  block list PAGE
  block normalize PAGE

Other:
  log [N]                         Recent commits
  stats                           Record counts
  help                            This message
  exit                            Leave the shell
"#;

fn invalid(message: String) -> DatabaseError {
    DatabaseError::InvalidCommand(message)
}

fn record_id(s: &str) -> DatabaseResult<RecordId> {
    RecordId::new(s).map_err(|e| invalid(e.to_string()))
}

fn parent_scope(s: &str) -> DatabaseResult<Option<RecordId>> {
    if s == "root" {
        Ok(None)
    } else {
        record_id(s).map(Some)
    }
}

fn order_index(s: &str) -> DatabaseResult<i64> {
    s.parse().map_err(|_| invalid(format!("not an order index: {}", s)))
}

/// `ID=N` or, for navigation, `ID=N@PARENT`.
fn reorder_entry(s: &str, with_parent: bool) -> DatabaseResult<ReorderEntry> {
    let (id, position) = s
        .split_once('=')
        .ok_or_else(|| invalid(format!("expected ID=N, got {}", s)))?;

    match position.split_once('@') {
        Some((index, parent)) if with_parent => {
            Ok(ReorderEntry::new(record_id(id)?, order_index(index)?).with_parent(parent_scope(parent)?))
        }
        Some(_) => Err(invalid(format!("blocks take no parent: {}", s))),
        None => Ok(ReorderEntry::new(record_id(id)?, order_index(position)?)),
    }
}

/// Whitespace-separated words; double quotes group words.
fn split_words(line: &str) -> DatabaseResult<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut started = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                started = true;
            }
            c if c.is_whitespace() && !quoted => {
                if started {
                    words.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if quoted {
        return Err(invalid("unterminated quote".into()));
    }
    if started {
        words.push(current);
    }
    Ok(words)
}

/// `--flag value` pairs and bare `--switch`es.
struct Flags {
    values: Vec<(String, Option<String>)>,
}

impl Flags {
    fn parse(words: &[&str]) -> DatabaseResult<Self> {
        let mut values = Vec::new();
        let mut iter = words.iter().peekable();
        while let Some(word) = iter.next() {
            if !word.starts_with("--") {
                return Err(invalid(format!("unexpected argument: {}", word)));
            }
            let value = match iter.peek() {
                Some(next) if !next.starts_with("--") => iter.next().map(|v| v.to_string()),
                _ => None,
            };
            values.push((word.to_string(), value));
        }
        Ok(Self { values })
    }

    fn take(&mut self, name: &str) -> Option<String> {
        let pos = self.values.iter().position(|(flag, value)| flag == name && value.is_some())?;
        self.values.remove(pos).1
    }

    fn switch(&mut self, name: &str) -> bool {
        match self.values.iter().position(|(flag, value)| flag == name && value.is_none()) {
            Some(pos) => {
                self.values.remove(pos);
                true
            }
            None => false,
        }
    }

    fn leftover(&self) -> Option<&str> {
        self.values.first().map(|(flag, _)| flag.as_str())
    }
}

fn listing(lines: impl Iterator<Item = String>) -> String {
    let lines: Vec<String> = lines.collect();
    if lines.is_empty() {
        "(empty)".to_string()
    } else {
        lines.join("\n")
    }
}

fn nav_line(item: &NavigationItem) -> String {
    let mut line = format!("{:>3}  {}  {}", item.order_index, item.id, item.label);
    if let Some(url) = &item.url {
        let _ = write!(line, " -> {}", url);
    }
    if !item.is_active {
        line.push_str(" [inactive]");
    }
    line
}

fn block_line(block: &ContentBlock) -> String {
    format!("{:>3}  {}  {} {}", block.order_index, block.id, block.block_type, block.data)
}

fn tree_lines(nodes: &[NavigationNode]) -> String {
    fn walk(nodes: &[NavigationNode], depth: usize, out: &mut Vec<String>) {
        for node in nodes {
            out.push(format!("{}{}", "    ".repeat(depth), nav_line(&node.item)));
            walk(&node.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    walk(nodes, 0, &mut out);
    listing(out.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn output(repl: &Repl, line: &str) -> String {
        match repl.execute(line).unwrap() {
            Outcome::Output(text) => text,
            Outcome::Exit => panic!("unexpected exit"),
        }
    }

    #[test]
    fn test_split_words_quotes() {
        assert_eq!(
            split_words(r#"nav add "About us" --url /about"#).unwrap(),
            vec!["nav", "add", "About us", "--url", "/about"]
        );
        assert_eq!(split_words(r#"block add p t """#).unwrap(), vec!["block", "add", "p", "t", ""]);
        assert!(split_words(r#"nav add "open"#).is_err());
    }

    #[test]
    fn test_parse_nav_commands() {
        assert_eq!(
            Command::parse("nav add Team --parent about --at 3 --inactive").unwrap(),
            Command::NavAdd {
                label: "Team".into(),
                url: None,
                parent: Some(id("about")),
                at: Some(3),
                inactive: true,
            }
        );
        assert_eq!(
            Command::parse("nav move team root").unwrap(),
            Command::NavMove {
                id: id("team"),
                parent: None
            }
        );
        assert_eq!(
            Command::parse("nav order root home=2 about=1@home").unwrap(),
            Command::NavOrder {
                parent: None,
                entries: vec![
                    ReorderEntry::new(id("home"), 2),
                    ReorderEntry::new(id("about"), 1).with_parent(Some(id("home"))),
                ],
            }
        );
    }

    #[test]
    fn test_parse_block_commands() {
        assert_eq!(
            Command::parse(r#"block add home hero {"title":"Hi"} --at 2"#).unwrap(),
            Command::BlockAdd {
                page: id("home"),
                block_type: "hero".into(),
                data: serde_json::json!({"title": "Hi"}),
                at: Some(2),
            }
        );
        assert!(Command::parse("block order home hero=1@other").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for line in ["", "nav", "nav add Home --bogus x", "nav order root", "log many", "nav move a"] {
            let err = Command::parse(line).unwrap_err();
            assert!(matches!(err, DatabaseError::InvalidCommand(_)), "{}", line);
        }
        assert_eq!(Command::parse("quit").unwrap(), Command::Exit);
    }

    #[test]
    fn test_session_against_database() {
        let repl = Repl::new(Database::in_memory().unwrap());

        let home = output(&repl, "nav add Home --url /");
        assert!(home.contains("Home -> /"));
        let home_id = home.split_whitespace().nth(1).unwrap().to_string();
        output(&repl, &format!("nav add Team --parent {}", home_id));
        output(&repl, "nav add Hidden --inactive");

        let tree = output(&repl, "nav tree");
        assert_eq!(tree.lines().count(), 3);
        assert!(tree.lines().any(|l| l.starts_with("    ") && l.contains("Team")));
        assert_eq!(output(&repl, "nav menu").lines().count(), 2);

        match repl.execute(&format!("nav delete {}", home_id)) {
            Err(DatabaseError::Engine(e)) => assert_eq!(e.reason_code(), "has-children"),
            other => panic!("expected has-children, got {:?}", other),
        }

        output(&repl, "block add home hero");
        output(&repl, "block add home seo");
        assert_eq!(output(&repl, "block list home").lines().count(), 2);
        assert!(output(&repl, "stats").contains("Content blocks: 2"));
        assert_eq!(output(&repl, "log 3").lines().count(), 3);
        assert_eq!(repl.execute("exit").unwrap(), Outcome::Exit);
    }
}
