//! Line-oriented rewriting of SQL dumps on their way into the database
//! container.

use regex::Regex;
use std::io::{self, BufRead, Read};
use std::sync::LazyLock;

static DEFINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"DEFINER[ ]*=[ ]*`[^`]+`@`[^`]+`").expect("definer pattern is valid")
});

static REPLICATION_VARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@@(GLOBAL\.GTID_PURGED|SESSION\.SQL_LOG_BIN)")
        .expect("replication pattern is valid")
});

/// Rewrite one dump line (without its terminator).
///
/// Explicit definers become `CURRENT_USER` so objects import under the
/// connecting account, and references to `@@GLOBAL.GTID_PURGED` and
/// `@@SESSION.SQL_LOG_BIN` are removed.
// NOTE: dropping the SQL_LOG_BIN reference leaves statements such as
// `SET = 0;` behind. This matches what existing dumps have always been fed
// through and is kept for compatibility.
pub fn rewrite_sql_line(line: &str) -> String {
    let line = DEFINER.replace_all(line, "DEFINER=CURRENT_USER");
    REPLICATION_VARS.replace_all(&line, "").into_owned()
}

/// [`Read`] adapter that applies [`rewrite_sql_line`] to every line of the
/// wrapped reader and terminates each output line with `\n`.
pub struct SqlRewriter<R> {
    inner: R,
    pending: Vec<u8>,
    pos: usize,
    raw: Vec<u8>,
}

impl<R: BufRead> SqlRewriter<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            pos: 0,
            raw: Vec::new(),
        }
    }

    /// Load the next rewritten line into `pending`. Returns `false` at EOF.
    fn fill(&mut self) -> io::Result<bool> {
        self.raw.clear();
        if self.inner.read_until(b'\n', &mut self.raw)? == 0 {
            return Ok(false);
        }
        let mut end = self.raw.len();
        if self.raw[..end].ends_with(b"\n") {
            end -= 1;
        }
        if self.raw[..end].ends_with(b"\r") {
            end -= 1;
        }
        let text = String::from_utf8_lossy(&self.raw[..end]);
        self.pending = rewrite_sql_line(&text).into_bytes();
        self.pending.push(b'\n');
        self.pos = 0;
        Ok(true)
    }
}

impl<R: BufRead> Read for SqlRewriter<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            if !self.fill()? {
                return Ok(0);
            }
        }
        let available = &self.pending[self.pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn definer_is_replaced() {
        let line = "/*!50013 DEFINER=`admin`@`%` SQL SECURITY DEFINER */";
        assert_eq!(
            rewrite_sql_line(line),
            "/*!50013 DEFINER=CURRENT_USER SQL SECURITY DEFINER */"
        );
        assert_eq!(
            rewrite_sql_line("CREATE DEFINER = `a`@`localhost` TRIGGER t"),
            "CREATE DEFINER=CURRENT_USER TRIGGER t"
        );
    }

    #[test]
    fn replication_variables_are_removed() {
        assert_eq!(
            rewrite_sql_line("SET @@GLOBAL.GTID_PURGED='abc';"),
            "SET ='abc';"
        );
        assert_eq!(rewrite_sql_line("SET @@SESSION.SQL_LOG_BIN= 0;"), "SET = 0;");
    }

    #[test]
    fn plain_lines_untouched() {
        let line = "INSERT INTO t VALUES (1,'DEFINER');";
        assert_eq!(rewrite_sql_line(line), line);
    }

    #[test]
    fn stream_rewrites_each_line_and_terminates() {
        let input = "A DEFINER=`x`@`y` B\r\nplain\nlast-no-newline";
        let mut out = String::new();
        SqlRewriter::new(Cursor::new(input))
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "A DEFINER=CURRENT_USER B\nplain\nlast-no-newline\n");
    }

    #[test]
    fn small_reads_reassemble() {
        let mut reader = SqlRewriter::new(Cursor::new("abc\ndef\n"));
        let mut out = Vec::new();
        let mut buf = [0u8; 2];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abc\ndef\n");
    }

    #[test]
    fn empty_input_yields_nothing() {
        let mut out = Vec::new();
        SqlRewriter::new(Cursor::new(""))
            .read_to_end(&mut out)
            .unwrap();
        assert!(out.is_empty());
    }
}
