use regex::RegexBuilder;

use crate::error::ExprError;
use crate::expression::value::Value;

/// Dispatch a built-in function call. Returns `None` when the name is not
/// a built-in, so user-defined functions of the same name take precedence
/// at the caller.
pub fn call(name: &str, args: &[Value]) -> Option<Result<Value, ExprError>> {
    let result = match name {
        "split" => split(args),
        "contains" => contains(args),
        "capture" => capture(args),
        "replace" => replace(args),
        "join" => join(args),
        "substring" => substring(args),
        "isNull" => Ok(Value::Bool(matches!(
            args.first(),
            None | Some(Value::Null)
        ))),
        "isNotNull" => Ok(Value::Bool(!matches!(
            args.first(),
            None | Some(Value::Null)
        ))),
        "length" => length(args),
        "min" => fold_numbers(name, args, f64::min),
        "max" => fold_numbers(name, args, f64::max),
        "abs" => map_number(name, args, f64::abs),
        "round" => map_number(name, args, f64::round),
        "floor" => map_number(name, args, f64::floor),
        "ceil" => map_number(name, args, f64::ceil),
        _ => return None,
    };
    Some(result)
}

pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "split"
            | "contains"
            | "capture"
            | "replace"
            | "join"
            | "substring"
            | "isNull"
            | "isNotNull"
            | "length"
            | "min"
            | "max"
            | "abs"
            | "round"
            | "floor"
            | "ceil"
    )
}

fn arg_str(name: &str, args: &[Value], index: usize) -> Result<String, ExprError> {
    match args.get(index) {
        Some(v) => Ok(v.render()),
        None => Err(ExprError::Arity {
            name: name.to_string(),
            expected: index + 1,
            got: args.len(),
        }),
    }
}

fn split(args: &[Value]) -> Result<Value, ExprError> {
    let haystack = arg_str("split", args, 0)?;
    let needle = arg_str("split", args, 1)?;
    let parts = haystack
        .split(needle.as_str())
        .map(|p| Value::Str(p.to_string()))
        .collect();
    Ok(Value::List(parts))
}

fn contains(args: &[Value]) -> Result<Value, ExprError> {
    match (args.first(), args.get(1)) {
        (Some(Value::List(items)), Some(needle)) => {
            Ok(Value::Bool(items.iter().any(|item| item == needle)))
        }
        (Some(haystack), Some(needle)) => {
            let h = haystack.render().to_lowercase();
            let n = needle.render().to_lowercase();
            Ok(Value::Bool(h.contains(&n)))
        }
        _ => Err(ExprError::Arity {
            name: "contains".to_string(),
            expected: 2,
            got: args.len(),
        }),
    }
}

fn build_regex(pattern: &str, flags: &str) -> Result<regex::Regex, ExprError> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| ExprError::Regex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// `capture(input, pattern, flags?)` -> list of capture-group lists, one
/// entry per match.
fn capture(args: &[Value]) -> Result<Value, ExprError> {
    let input = arg_str("capture", args, 0)?;
    let pattern = arg_str("capture", args, 1)?;
    let flags = args.get(2).map(Value::render).unwrap_or_default();
    let re = build_regex(&pattern, &flags)?;

    let mut matches = Vec::new();
    for caps in re.captures_iter(&input) {
        let groups: Vec<Value> = caps
            .iter()
            .skip(1)
            .map(|g| match g {
                Some(m) => Value::Str(m.as_str().to_string()),
                None => Value::Null,
            })
            .collect();
        matches.push(Value::List(groups));
    }
    Ok(Value::List(matches))
}

fn replace(args: &[Value]) -> Result<Value, ExprError> {
    let input = arg_str("replace", args, 0)?;
    let pattern = arg_str("replace", args, 1)?;
    let replacement = arg_str("replace", args, 2)?;
    let re = build_regex(&pattern, "")?;
    Ok(Value::Str(
        re.replace_all(&input, replacement.as_str()).into_owned(),
    ))
}

fn join(args: &[Value]) -> Result<Value, ExprError> {
    let separator = args.get(1).map(Value::render).unwrap_or_default();
    match args.first() {
        Some(Value::List(items)) => {
            let parts: Vec<String> = items.iter().map(Value::render).collect();
            Ok(Value::Str(parts.join(&separator)))
        }
        Some(Value::Null) | None => Ok(Value::Str(String::new())),
        Some(other) => Ok(Value::Str(other.render())),
    }
}

fn substring(args: &[Value]) -> Result<Value, ExprError> {
    let input = match args.first() {
        Some(Value::Null) | None => return Ok(Value::Null),
        Some(v) => v.render(),
    };
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let start = args
        .get(1)
        .and_then(Value::as_number)
        .map(|n| n.max(0.0) as usize)
        .unwrap_or(0)
        .min(len);
    let end = args
        .get(2)
        .and_then(Value::as_number)
        .map(|n| n.max(0.0) as usize)
        .unwrap_or(len)
        .min(len);
    if start >= end {
        return Ok(Value::Str(String::new()));
    }
    Ok(Value::Str(chars[start..end].iter().collect()))
}

fn length(args: &[Value]) -> Result<Value, ExprError> {
    let n = match args.first() {
        Some(Value::List(items)) => items.len(),
        Some(Value::Str(s)) => s.chars().count(),
        Some(Value::Null) | None => 0,
        Some(other) => {
            return Err(ExprError::Type(format!(
                "length() expects a string or list, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Number(n as f64))
}

fn fold_numbers(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, ExprError> {
    // A single list argument folds over its elements.
    let values: Vec<&Value> = match args {
        [Value::List(items)] => items.iter().collect(),
        _ => args.iter().collect(),
    };
    let mut numbers = values.iter().filter_map(|v| v.as_number());
    let first = numbers.next().ok_or_else(|| ExprError::Arity {
        name: name.to_string(),
        expected: 1,
        got: 0,
    })?;
    Ok(Value::Number(numbers.fold(first, f)))
}

fn map_number(name: &str, args: &[Value], f: fn(f64) -> f64) -> Result<Value, ExprError> {
    let n = args
        .first()
        .and_then(Value::as_number)
        .ok_or_else(|| ExprError::Type(format!("{name}() expects a number")))?;
    Ok(Value::Number(f(n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_ok(name: &str, args: &[Value]) -> Value {
        call(name, args).unwrap().unwrap()
    }

    #[test]
    fn split_and_join_round_trip() {
        let parts = call_ok("split", &["a,b,c".into(), ",".into()]);
        assert_eq!(
            parts,
            Value::List(vec!["a".into(), "b".into(), "c".into()])
        );
        let joined = call_ok("join", &[parts, "-".into()]);
        assert_eq!(joined, Value::Str("a-b-c".into()));
    }

    #[test]
    fn contains_is_case_insensitive_for_strings() {
        assert_eq!(
            call_ok("contains", &["Hello World".into(), "world".into()]),
            Value::Bool(true)
        );
        let list = Value::List(vec!["a".into(), "b".into()]);
        assert_eq!(
            call_ok("contains", &[list, "b".into()]),
            Value::Bool(true)
        );
    }

    #[test]
    fn capture_returns_group_lists() {
        let result = call_ok(
            "capture",
            &["x=1 y=2".into(), r"(\w)=(\d)".into(), "g".into()],
        );
        assert_eq!(
            result,
            Value::List(vec![
                Value::List(vec!["x".into(), "1".into()]),
                Value::List(vec!["y".into(), "2".into()]),
            ])
        );
    }

    #[test]
    fn replace_all_occurrences() {
        assert_eq!(
            call_ok("replace", &["aaa".into(), "a".into(), "b".into()]),
            Value::Str("bbb".into())
        );
    }

    #[test]
    fn substring_clamps_bounds() {
        assert_eq!(
            call_ok(
                "substring",
                &["hello".into(), Value::Number(1.0), Value::Number(100.0)]
            ),
            Value::Str("ello".into())
        );
        assert_eq!(call_ok("substring", &[Value::Null]), Value::Null);
    }

    #[test]
    fn null_checks() {
        assert_eq!(call_ok("isNull", &[Value::Null]), Value::Bool(true));
        assert_eq!(call_ok("isNotNull", &["x".into()]), Value::Bool(true));
    }

    #[test]
    fn unknown_name_is_not_builtin() {
        assert!(call("definitelyNotBuiltin", &[]).is_none());
    }
}
