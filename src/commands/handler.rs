//! Command Dispatcher
//!
//! Maps one decoded [`Frame`] to a store operation and produces exactly one
//! [`Reply`]. The dispatcher holds no state between calls other than its
//! handle on the store.
//!
//! ## Supported Commands
//!
//! - `SET key value [EX seconds]` - upsert; without EX any old expiry is cleared
//! - `GET key` - bulk value, or nil if absent or expired
//! - `EXPIRE key seconds` - OK, or nil if the key does not exist
//!
//! Command names are matched case-insensitively. Bad arguments and unknown
//! commands become error replies; they never end the connection.

use crate::protocol::{Frame, Reply};
use crate::storage::{Store, StoreError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

/// Handles commands by dispatching them to the store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: Arc<Store>,
}

impl CommandHandler {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Executes a command and returns the reply to send back.
    pub fn execute(&self, frame: &Frame) -> Reply {
        let name = match frame.command() {
            Some(name) => name,
            None => return Reply::error("ERR empty command"),
        };
        let args = frame.operands();

        match name.to_ascii_uppercase().as_slice() {
            b"SET" => self.cmd_set(args),
            b"GET" => self.cmd_get(args),
            b"EXPIRE" => self.cmd_expire(args),
            _ => Reply::error(format!(
                "ERR unknown command '{}'",
                String::from_utf8_lossy(name)
            )),
        }
    }

    /// SET key value [EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return wrong_arity("set");
        }

        let key = args[0].clone();
        let value = args[1].clone();
        let mut ttl: Option<Duration> = None;

        let mut options = args[2..].iter();
        while let Some(opt) = options.next() {
            if !opt.eq_ignore_ascii_case(b"EX") {
                return Reply::error("ERR syntax error");
            }
            let secs = match options.next() {
                Some(raw) => raw,
                None => return Reply::error("ERR syntax error"),
            };
            ttl = match parse_seconds(secs, "set") {
                Ok(ttl) => Some(ttl),
                Err(reply) => return reply,
            };
        }

        match self.store.set(key, value, ttl) {
            Ok(()) => Reply::Ok,
            Err(e) => store_error(e, "set"),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> Reply {
        if args.len() != 1 {
            return wrong_arity("get");
        }

        Reply::from_option(self.store.get(&args[0]))
    }

    /// EXPIRE key seconds
    fn cmd_expire(&self, args: &[Bytes]) -> Reply {
        if args.len() != 2 {
            return wrong_arity("expire");
        }

        let ttl = match parse_seconds(&args[1], "expire") {
            Ok(ttl) => ttl,
            Err(reply) => return reply,
        };

        match self.store.expire(&args[0], ttl) {
            Ok(true) => Reply::Ok,
            Ok(false) => Reply::Nil,
            Err(e) => store_error(e, "expire"),
        }
    }
}

fn wrong_arity(cmd: &str) -> Reply {
    Reply::error(format!(
        "ERR wrong number of arguments for '{}' command",
        cmd
    ))
}

/// Parses a strictly positive number of seconds.
///
/// Non-integers and non-positive integers produce the error reply to send.
fn parse_seconds(raw: &[u8], cmd: &str) -> Result<Duration, Reply> {
    let secs: i64 = std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Reply::error("ERR value is not an integer or out of range"))?;

    if secs <= 0 {
        return Err(invalid_expire(cmd));
    }
    Ok(Duration::from_secs(secs as u64))
}

fn invalid_expire(cmd: &str) -> Reply {
    Reply::error(format!("ERR invalid expire time in '{}' command", cmd))
}

fn store_error(err: StoreError, cmd: &str) -> Reply {
    match err {
        StoreError::NonPositiveTtl | StoreError::TtlOutOfRange => invalid_expire(cmd),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> CommandHandler {
        CommandHandler::new(Arc::new(Store::new()))
    }

    fn run(handler: &CommandHandler, parts: &[&str]) -> Reply {
        handler.execute(&Frame::from_parts(parts))
    }

    #[test]
    fn test_set_then_get() {
        let h = handler();
        assert_eq!(run(&h, &["SET", "foo", "bar"]), Reply::Ok);
        assert_eq!(run(&h, &["GET", "foo"]), Reply::bulk("bar"));
        assert_eq!(run(&h, &["GET", "noexist"]), Reply::Nil);
    }

    #[test]
    fn test_case_insensitive_names() {
        let h = handler();
        assert_eq!(run(&h, &["set", "k", "v"]), Reply::Ok);
        assert_eq!(run(&h, &["gEt", "k"]), Reply::bulk("v"));
        assert_eq!(run(&h, &["SET", "k", "v", "ex", "10"]), Reply::Ok);
        assert_eq!(run(&h, &["Expire", "k", "10"]), Reply::Ok);
    }

    #[test]
    fn test_unknown_command_names_token() {
        let h = handler();
        assert_eq!(
            run(&h, &["FOO", "bar"]),
            Reply::error("ERR unknown command 'FOO'")
        );
        assert_eq!(
            run(&h, &["flushall"]),
            Reply::error("ERR unknown command 'flushall'")
        );
    }

    #[test]
    fn test_wrong_arity() {
        let h = handler();
        assert_eq!(
            run(&h, &["SET", "k"]),
            Reply::error("ERR wrong number of arguments for 'set' command")
        );
        assert_eq!(
            run(&h, &["GET"]),
            Reply::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(
            run(&h, &["GET", "a", "b"]),
            Reply::error("ERR wrong number of arguments for 'get' command")
        );
        assert_eq!(
            run(&h, &["EXPIRE", "k"]),
            Reply::error("ERR wrong number of arguments for 'expire' command")
        );
    }

    #[test]
    fn test_set_ex_validation() {
        let h = handler();
        assert_eq!(
            run(&h, &["SET", "k", "v", "EX", "ten"]),
            Reply::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&h, &["SET", "k", "v", "EX", "0"]),
            Reply::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(
            run(&h, &["SET", "k", "v", "EX", "-5"]),
            Reply::error("ERR invalid expire time in 'set' command")
        );
        assert_eq!(
            run(&h, &["SET", "k", "v", "EX"]),
            Reply::error("ERR syntax error")
        );
        assert_eq!(
            run(&h, &["SET", "k", "v", "PX", "10"]),
            Reply::error("ERR syntax error")
        );
        assert_eq!(
            run(&h, &["SET", "k", "v", "EX", "9223372036854775807"]),
            Reply::error("ERR invalid expire time in 'set' command")
        );
        // Nothing was stored by the rejected calls
        assert_eq!(run(&h, &["GET", "k"]), Reply::Nil);
    }

    #[test]
    fn test_set_ex_sets_ttl() {
        let h = handler();
        assert_eq!(run(&h, &["SET", "k", "v", "EX", "100"]), Reply::Ok);
        let ttl = h.store().ttl(b"k").flatten().unwrap();
        assert!(ttl <= Duration::from_secs(100));
        assert!(ttl > Duration::from_secs(90));

        assert_eq!(run(&h, &["SET", "k", "v2"]), Reply::Ok);
        assert_eq!(h.store().ttl(b"k"), Some(None));
    }

    #[test]
    fn test_expire() {
        let h = handler();
        assert_eq!(run(&h, &["EXPIRE", "missing", "10"]), Reply::Nil);

        run(&h, &["SET", "k", "v"]);
        assert_eq!(run(&h, &["EXPIRE", "k", "10"]), Reply::Ok);
        assert!(h.store().ttl(b"k").flatten().is_some());

        assert_eq!(
            run(&h, &["EXPIRE", "k", "soon"]),
            Reply::error("ERR value is not an integer or out of range")
        );
        assert_eq!(
            run(&h, &["EXPIRE", "k", "0"]),
            Reply::error("ERR invalid expire time in 'expire' command")
        );
        assert_eq!(run(&h, &["GET", "k"]), Reply::bulk("v"));
    }

    #[test]
    fn test_binary_safe_values() {
        let h = handler();
        assert_eq!(run(&h, &["SET", "k", "a\r\nb"]), Reply::Ok);
        assert_eq!(run(&h, &["GET", "k"]), Reply::bulk("a\r\nb"));
        assert_eq!(run(&h, &["SET", "e", ""]), Reply::Ok);
        assert_eq!(run(&h, &["GET", "e"]), Reply::bulk(""));
    }

    #[test]
    fn test_empty_frame() {
        let h = handler();
        assert_eq!(
            h.execute(&Frame::new(vec![])),
            Reply::error("ERR empty command")
        );
    }

    #[test]
    fn test_error_then_success_shares_store() {
        let h = handler();
        assert!(run(&h, &["FOO", "bar"]).is_error());
        assert_eq!(run(&h, &["SET", "after", "1"]), Reply::Ok);
        assert_eq!(run(&h, &["GET", "after"]), Reply::bulk("1"));
    }
}
