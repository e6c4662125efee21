//! Directive script parser.
//!
//! Grammar: `VERB [arg {, arg}] ;` repeated, whitespace-insensitive between
//! tokens. Arguments are single- or double-quoted and may use the XML
//! entities `&amp; &lt; &gt; &quot; &apos;` and numeric `&#N;`/`&#xH;` forms.

use super::SnapshotError;
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Add(String),
    AddIf(String),
    Set(String),
    Up,
    Attr(String, String),
    XPath(String),
    Remove,
    Strict(usize),
}

/// Parses a whole script. An unterminated last directive is a syntax error,
/// which is the usual shape of a document still being written.
pub fn parse_script(script: &str) -> Result<Vec<Directive>, SnapshotError> {
    let mut parser = Parser {
        chars: script.char_indices().peekable(),
        len: script.len(),
    };
    let mut directives = Vec::new();
    loop {
        parser.skip_whitespace();
        let Some(&(start, _)) = parser.chars.peek() else {
            return Ok(directives);
        };
        let verb = parser.verb()?;
        let args = parser.args()?;
        directives.push(build(start, &verb, args)?);
    }
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
    len: usize,
}

impl Parser<'_> {
    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.len, |&(idx, _)| idx)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, ch)| ch.is_whitespace()).is_some() {}
    }

    fn verb(&mut self) -> Result<String, SnapshotError> {
        let position = self.position();
        let mut verb = String::new();
        while let Some((_, ch)) = self.chars.next_if(|(_, ch)| ch.is_ascii_alphabetic()) {
            verb.push(ch.to_ascii_uppercase());
        }
        if verb.is_empty() {
            return Err(SnapshotError::syntax(position, "directive name expected"));
        }
        Ok(verb)
    }

    fn args(&mut self) -> Result<Vec<String>, SnapshotError> {
        let mut args = Vec::new();
        loop {
            self.skip_whitespace();
            let position = self.position();
            match self.chars.next() {
                Some((_, ';')) => return Ok(args),
                Some((_, ',')) if !args.is_empty() => {
                    self.skip_whitespace();
                    args.push(self.quoted()?);
                }
                Some((_, quote @ ('\'' | '"'))) if args.is_empty() => {
                    args.push(self.quoted_body(quote)?);
                }
                Some((_, ch)) => {
                    return Err(SnapshotError::syntax(
                        position,
                        format!("unexpected character `{ch}`"),
                    ))
                }
                None => return Err(SnapshotError::syntax(position, "`;` expected")),
            }
        }
    }

    fn quoted(&mut self) -> Result<String, SnapshotError> {
        let position = self.position();
        match self.chars.next() {
            Some((_, quote @ ('\'' | '"'))) => self.quoted_body(quote),
            _ => Err(SnapshotError::syntax(position, "quoted argument expected")),
        }
    }

    fn quoted_body(&mut self, quote: char) -> Result<String, SnapshotError> {
        let position = self.position();
        let mut raw = String::new();
        for (_, ch) in self.chars.by_ref() {
            if ch == quote {
                return Ok(decode_entities(&raw));
            }
            raw.push(ch);
        }
        Err(SnapshotError::syntax(position, "unterminated argument"))
    }
}

fn build(position: usize, verb: &str, mut args: Vec<String>) -> Result<Directive, SnapshotError> {
    let directive = match verb {
        "ADD" => {
            check_arity(position, verb, &args, 1)?;
            Directive::Add(args.remove(0))
        }
        "ADDIF" => {
            check_arity(position, verb, &args, 1)?;
            Directive::AddIf(args.remove(0))
        }
        "SET" => {
            check_arity(position, verb, &args, 1)?;
            Directive::Set(args.remove(0))
        }
        "UP" => {
            check_arity(position, verb, &args, 0)?;
            Directive::Up
        }
        "ATTR" => {
            check_arity(position, verb, &args, 2)?;
            let value = args.remove(1);
            Directive::Attr(args.remove(0), value)
        }
        "XPATH" => {
            check_arity(position, verb, &args, 1)?;
            Directive::XPath(args.remove(0))
        }
        "REMOVE" => {
            check_arity(position, verb, &args, 0)?;
            Directive::Remove
        }
        "STRICT" => {
            check_arity(position, verb, &args, 1)?;
            let count = args[0].trim().parse::<usize>().map_err(|_| {
                SnapshotError::syntax(position, format!("STRICT needs a count, got `{}`", args[0]))
            })?;
            Directive::Strict(count)
        }
        other => {
            return Err(SnapshotError::syntax(
                position,
                format!("unknown directive `{other}`"),
            ))
        }
    };
    Ok(directive)
}

fn check_arity(
    position: usize,
    verb: &str,
    args: &[String],
    expected: usize,
) -> Result<(), SnapshotError> {
    if args.len() == expected {
        return Ok(());
    }
    Err(SnapshotError::syntax(
        position,
        format!("{verb} takes {expected} argument(s), got {}", args.len()),
    ))
}

fn decode_entities(raw: &str) -> String {
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let replacement = tail
            .find(';')
            .and_then(|semi| entity(&tail[1..semi]).map(|ch| (ch, semi)));
        match replacement {
            Some((ch, semi)) => {
                decoded.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                decoded.push('&');
                rest = &tail[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x") {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_script, Directive};

    #[test]
    fn parses_verbs_and_arguments() {
        let directives =
            parse_script("ADD 'tags';\n add \"tag\" ; ATTR 'k', 'v'; UP;STRICT '1';").unwrap();
        assert_eq!(
            directives,
            vec![
                Directive::Add("tags".to_string()),
                Directive::Add("tag".to_string()),
                Directive::Attr("k".to_string(), "v".to_string()),
                Directive::Up,
                Directive::Strict(1),
            ]
        );
    }

    #[test]
    fn decodes_entities_in_arguments() {
        let directives = parse_script("SET '&lt;b&gt; it&apos;s &amp; &#65;&#x42; &nope;';").unwrap();
        assert_eq!(directives, vec![Directive::Set("<b> it's & AB &nope;".to_string())]);
    }

    #[test]
    fn unterminated_directive_is_an_error() {
        assert!(parse_script("ADD 'a'").is_err());
        assert!(parse_script("SET 'half").is_err());
    }

    #[test]
    fn wrong_arity_is_an_error() {
        assert!(parse_script("UP 'x';").is_err());
        assert!(parse_script("ATTR 'only';").is_err());
    }

    #[test]
    fn empty_script_has_no_directives() {
        assert!(parse_script("  \n ").unwrap().is_empty());
    }
}
