// Built-in static functions, resolved by name through the static
// context. Arguments arrive fully materialised; sequence-typed results
// are rescoped by the call site.

use std::collections::HashMap;

use crate::context::{DynamicContext, Function, FunctionImpl};
use crate::error::{Error, ErrorCode, Result};
use crate::sequence::effective_boolean_items;
use crate::value::{Atomic, Item};

pub fn builtins() -> HashMap<String, Function> {
    let table: &[(&str, usize, usize, FunctionImpl)] = &[
        ("position", 0, 0, fn_position),
        ("last", 0, 0, fn_last),
        ("count", 1, 1, fn_count),
        ("string", 0, 1, fn_string),
        ("number", 0, 1, fn_number),
        ("boolean", 1, 1, fn_boolean),
        ("not", 1, 1, fn_not),
        ("true", 0, 0, fn_true),
        ("false", 0, 0, fn_false),
        ("name", 0, 1, fn_name),
        ("local-name", 0, 1, fn_name),
        ("concat", 2, usize::MAX, fn_concat),
        ("contains", 2, 2, fn_contains),
        ("starts-with", 2, 2, fn_starts_with),
        ("substring-before", 2, 2, fn_substring_before),
        ("substring-after", 2, 2, fn_substring_after),
        ("substring", 2, 3, fn_substring),
        ("string-length", 0, 1, fn_string_length),
        ("normalize-space", 0, 1, fn_normalize_space),
        ("sum", 1, 1, fn_sum),
        ("floor", 1, 1, fn_floor),
        ("ceiling", 1, 1, fn_ceiling),
        ("round", 1, 1, fn_round),
    ];

    table
        .iter()
        .map(|(name, min_args, max_args, run)| {
            (
                name.to_string(),
                Function {
                    min_args: *min_args,
                    max_args: *max_args,
                    run: *run,
                },
            )
        })
        .collect()
}

fn one<'d>(atomic: Atomic) -> Vec<Item<'d>> {
    vec![Item::Atomic(atomic)]
}

/// String value of an optional-argument sequence: empty is the empty
/// string, more than one item is a cardinality error.
fn single_string(items: &[Item<'_>], what: &str) -> Result<String> {
    match items {
        [] => Ok(String::new()),
        [item] => Ok(item.string_value()),
        _ => Err(Error::eval(
            ErrorCode::XPTY0004,
            format!("{what} expects at most one item per argument"),
        )),
    }
}

fn subject_string<'a>(ctx: &DynamicContext<'_>, args: &'a [Vec<Item<'_>>], what: &str) -> Result<String> {
    match args.first() {
        Some(items) => single_string(items, what),
        None => Ok(ctx.item.string_value()),
    }
}

fn fn_position<'d>(ctx: &DynamicContext<'d>, _: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Integer(ctx.position as i64)))
}

fn fn_last<'d>(ctx: &DynamicContext<'d>, _: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let size = ctx.size.ok_or_else(|| {
        Error::eval(
            ErrorCode::XPDY0002,
            "the context size is not known while streaming",
        )
    })?;

    Ok(one(Atomic::Integer(size as i64)))
}

fn fn_count<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Integer(args[0].len() as i64)))
}

fn fn_string<'d>(ctx: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Str(subject_string(ctx, args, "string()")?)))
}

fn fn_number<'d>(ctx: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let items = match args.first() {
        Some(items) => items.clone(),
        None => vec![ctx.item.clone()],
    };

    let value = match items.as_slice() {
        [item] => match item.atomized().0 {
            Atomic::Integer(v) => v as f64,
            Atomic::Double(v) => v,
            Atomic::Boolean(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
            // number() never raises on a bad lexical value
            Atomic::Str(text) => text.trim().parse::<f64>().unwrap_or(f64::NAN),
        },
        _ => f64::NAN,
    };

    Ok(one(Atomic::Double(value)))
}

fn fn_boolean<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Boolean(effective_boolean_items(&args[0])?)))
}

fn fn_not<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Boolean(!effective_boolean_items(&args[0])?)))
}

fn fn_true<'d>(_: &DynamicContext<'d>, _: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Boolean(true)))
}

fn fn_false<'d>(_: &DynamicContext<'d>, _: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    Ok(one(Atomic::Boolean(false)))
}

// QNames are out of scope, so name() and local-name() coincide.
fn fn_name<'d>(ctx: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let items = match args.first() {
        Some(items) => items.as_slice(),
        None => std::slice::from_ref(&ctx.item),
    };

    let name = match items {
        [] => String::new(),
        [item] => item.name().ok_or_else(|| {
            Error::eval(ErrorCode::XPTY0004, "name() requires a node argument")
        })?,
        _ => {
            return Err(Error::eval(
                ErrorCode::XPTY0004,
                "name() expects at most one item",
            ));
        }
    };

    Ok(one(Atomic::Str(name)))
}

fn fn_concat<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let mut out = String::new();

    for arg in args {
        out.push_str(&single_string(arg, "concat()")?);
    }

    Ok(one(Atomic::Str(out)))
}

fn fn_contains<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let haystack = single_string(&args[0], "contains()")?;
    let needle = single_string(&args[1], "contains()")?;

    Ok(one(Atomic::Boolean(haystack.contains(&needle))))
}

fn fn_starts_with<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let haystack = single_string(&args[0], "starts-with()")?;
    let prefix = single_string(&args[1], "starts-with()")?;

    Ok(one(Atomic::Boolean(haystack.starts_with(&prefix))))
}

fn fn_substring_before<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let text = single_string(&args[0], "substring-before()")?;
    let sep = single_string(&args[1], "substring-before()")?;

    let out = match text.find(&sep) {
        Some(at) if !sep.is_empty() => text[..at].to_string(),
        _ => String::new(),
    };

    Ok(one(Atomic::Str(out)))
}

fn fn_substring_after<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let text = single_string(&args[0], "substring-after()")?;
    let sep = single_string(&args[1], "substring-after()")?;

    let out = match text.find(&sep) {
        Some(at) if !sep.is_empty() => text[at + sep.len()..].to_string(),
        _ => String::new(),
    };

    Ok(one(Atomic::Str(out)))
}

fn argument_number(items: &[Item<'_>], what: &str) -> Result<f64> {
    match items {
        [item] => match item.atomized().0 {
            Atomic::Integer(v) => Ok(v as f64),
            Atomic::Double(v) => Ok(v),
            Atomic::Str(text) => Ok(text.trim().parse::<f64>().unwrap_or(f64::NAN)),
            Atomic::Boolean(_) => Err(Error::eval(
                ErrorCode::XPTY0004,
                format!("{what} expects a numeric argument"),
            )),
        },
        _ => Err(Error::eval(
            ErrorCode::XPTY0004,
            format!("{what} expects a single numeric argument"),
        )),
    }
}

// Characters are selected by 1-based position against the rounded start
// and length, so fractional and out-of-range arguments degrade instead
// of raising.
fn fn_substring<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let text = single_string(&args[0], "substring()")?;
    let start = xpath_round(argument_number(&args[1], "substring()")?);

    let end = match args.get(2) {
        Some(length) => start + xpath_round(argument_number(length, "substring()")?),
        None => f64::INFINITY,
    };

    let out: String = text
        .chars()
        .enumerate()
        .filter(|(index, _)| {
            let position = (index + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();

    Ok(one(Atomic::Str(out)))
}

fn fn_string_length<'d>(ctx: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let text = subject_string(ctx, args, "string-length()")?;

    Ok(one(Atomic::Integer(text.chars().count() as i64)))
}

fn fn_normalize_space<'d>(ctx: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let text = subject_string(ctx, args, "normalize-space()")?;
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    Ok(one(Atomic::Str(normalized)))
}

fn fn_sum<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    let mut int_sum: i64 = 0;
    let mut double_sum = 0.0;
    let mut all_integers = true;

    for item in &args[0] {
        match item.atomized() {
            (Atomic::Integer(v), _) => {
                int_sum = int_sum
                    .checked_add(v)
                    .ok_or_else(|| Error::eval(ErrorCode::FOAR0002, "integer overflow in sum()"))?;
                double_sum += v as f64;
            }
            (Atomic::Double(v), _) => {
                all_integers = false;
                double_sum += v;
            }
            (Atomic::Str(text), true) => {
                all_integers = false;
                double_sum += text.trim().parse::<f64>().map_err(|_| {
                    Error::eval(
                        ErrorCode::FOCA0002,
                        format!("cannot cast \"{text}\" to a number"),
                    )
                })?;
            }
            (atomic, _) => {
                return Err(Error::eval(
                    ErrorCode::XPTY0004,
                    format!("sum() over a {} value", atomic.type_name()),
                ));
            }
        }
    }

    if all_integers {
        Ok(one(Atomic::Integer(int_sum)))
    } else {
        Ok(one(Atomic::Double(double_sum)))
    }
}

fn numeric_unary<'d>(
    args: &[Vec<Item<'d>>],
    what: &str,
    apply: fn(f64) -> f64,
) -> Result<Vec<Item<'d>>> {
    if args[0].is_empty() {
        return Ok(Vec::new());
    }

    match args[0].as_slice() {
        [Item::Atomic(Atomic::Integer(v))] => Ok(one(Atomic::Integer(*v))),
        items => Ok(one(Atomic::Double(apply(argument_number(items, what)?)))),
    }
}

fn fn_floor<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    numeric_unary(args, "floor()", f64::floor)
}

fn fn_ceiling<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    numeric_unary(args, "ceiling()", f64::ceil)
}

fn fn_round<'d>(_: &DynamicContext<'d>, args: &[Vec<Item<'d>>]) -> Result<Vec<Item<'d>>> {
    numeric_unary(args, "round()", xpath_round)
}

/// Round half towards positive infinity, keeping NaN.
fn xpath_round(value: f64) -> f64 {
    if value.is_nan() {
        value
    } else {
        (value + 0.5).floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticContext;
    use crate::eval::evaluate;
    use crate::parser::parse;
    use std::rc::Rc;

    fn run_one(query: &str) -> Atomic {
        let ctx = DynamicContext::new(
            Item::Atomic(Atomic::Str("ctx".to_string())),
            Rc::new(StaticContext::default()),
        );

        let items = evaluate(&parse(query).unwrap(), &ctx)
            .unwrap_or_else(|e| panic!("query {query:?} failed: {e}"))
            .materialize_items()
            .unwrap_or_else(|e| panic!("query {query:?} failed: {e}"));

        assert_eq!(items.len(), 1, "query {query:?} returned {items:?}");
        items[0].as_atomic().expect("atomic result").clone()
    }

    #[test]
    fn string_functions() {
        assert_eq!(run_one("string('a')"), Atomic::Str("a".to_string()));
        assert_eq!(run_one("string(12)"), Atomic::Str("12".to_string()));
        assert_eq!(run_one("string(())"), Atomic::Str(String::new()));
        assert_eq!(run_one("string()"), Atomic::Str("ctx".to_string()));
        assert_eq!(
            run_one("concat('a', 'b', 'c')"),
            Atomic::Str("abc".to_string())
        );
        assert_eq!(run_one("contains('abc', 'b')"), Atomic::Boolean(true));
        assert_eq!(run_one("starts-with('abc', 'a')"), Atomic::Boolean(true));
        assert_eq!(
            run_one("substring-before('a=b', '=')"),
            Atomic::Str("a".to_string())
        );
        assert_eq!(
            run_one("substring-after('a=b', '=')"),
            Atomic::Str("b".to_string())
        );
        assert_eq!(
            run_one("substring('12345', 2)"),
            Atomic::Str("2345".to_string())
        );
        assert_eq!(
            run_one("substring('12345', 2, 3)"),
            Atomic::Str("234".to_string())
        );
        assert_eq!(
            run_one("substring('12345', 1.5, 2.6)"),
            Atomic::Str("234".to_string())
        );
        assert_eq!(run_one("string-length('abcd')"), Atomic::Integer(4));
        assert_eq!(
            run_one("normalize-space('  a   b ')"),
            Atomic::Str("a b".to_string())
        );
    }

    #[test]
    fn boolean_functions() {
        assert_eq!(run_one("true()"), Atomic::Boolean(true));
        assert_eq!(run_one("false()"), Atomic::Boolean(false));
        assert_eq!(run_one("not(())"), Atomic::Boolean(true));
        assert_eq!(run_one("not('x')"), Atomic::Boolean(false));
        assert_eq!(run_one("boolean(0)"), Atomic::Boolean(false));
        assert_eq!(run_one("boolean('')"), Atomic::Boolean(false));
        assert_eq!(run_one("boolean('x')"), Atomic::Boolean(true));
    }

    #[test]
    fn boolean_of_two_atomics_needs_a_node() {
        // a multi-atomic sequence has no effective boolean value
        let ctx = DynamicContext::new(
            Item::Atomic(Atomic::Integer(0)),
            Rc::new(StaticContext::default()),
        );

        let err = evaluate(&parse("boolean((1, 2))").unwrap(), &ctx)
            .unwrap()
            .materialize_items()
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::XPTY0004);
    }

    #[test]
    fn numeric_functions() {
        assert_eq!(run_one("count((1, 2, 3))"), Atomic::Integer(3));
        assert_eq!(run_one("count(())"), Atomic::Integer(0));
        assert_eq!(run_one("sum((1, 2, 3))"), Atomic::Integer(6));
        assert_eq!(run_one("sum(())"), Atomic::Integer(0));
        assert_eq!(run_one("sum((1, 2.5))"), Atomic::Double(3.5));
        assert_eq!(run_one("floor(2.7)"), Atomic::Double(2.0));
        assert_eq!(run_one("ceiling(2.1)"), Atomic::Double(3.0));
        assert_eq!(run_one("round(2.5)"), Atomic::Double(3.0));
        assert_eq!(run_one("round(-2.5)"), Atomic::Double(-2.0));
        assert_eq!(run_one("floor(3)"), Atomic::Integer(3));
        assert_eq!(run_one("number('3.5')"), Atomic::Double(3.5));
        assert_eq!(run_one("number(true())"), Atomic::Double(1.0));

        let Atomic::Double(nan) = run_one("number('abc')") else {
            panic!("expected a double");
        };
        assert!(nan.is_nan());
    }

    #[test]
    fn position_and_last_over_a_filtered_sequence() {
        assert_eq!(run_one("(10, 20, 30)[position() eq 2]"), Atomic::Integer(20));
        assert_eq!(run_one("(10, 20, 30)[last()]"), Atomic::Integer(30));
        assert_eq!(run_one("(10, 20, 30)[position() lt 2]"), Atomic::Integer(10));
    }
}
