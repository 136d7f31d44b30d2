//! Indication query trees and their compilation to the repository's
//! filter form.
//!
//! A query is a boolean tree whose internal nodes are strictly binary
//! `AND`/`OR` and whose leaves are [`Indication`] buffers. Compilation
//! is a post-order walk with an explicit stack: each frame carries
//! exactly two rewritten-child slots, so any node of other arity fails
//! with `unsupported-expression`. A leaf rewrites to the conjunction,
//! over its entries, of "the resource has an indication row with this
//! key and value"; the whole tree becomes a filter over the
//! `resource × indication` join projected to distinct resource URIs.

use super::key_as_text;
use crate::error::{AppError, Result};
use crate::indication::Indication;

/// A boolean query over indication predicates.
///
/// `And`/`Or` carry their children as vectors so that callers folding
/// n-ary input can be diagnosed: the compiler rejects any arity other
/// than two rather than silently reshaping the tree.
#[derive(Debug, Clone)]
pub enum UriQuery {
    /// Match resources carrying every `(key, value)` entry of this
    /// indication.
    Indication(Indication),
    And(Vec<UriQuery>),
    Or(Vec<UriQuery>),
}

impl UriQuery {
    pub fn indication(ind: Indication) -> Self {
        UriQuery::Indication(ind)
    }

    pub fn and(left: UriQuery, right: UriQuery) -> Self {
        UriQuery::And(vec![left, right])
    }

    pub fn or(left: UriQuery, right: UriQuery) -> Self {
        UriQuery::Or(vec![left, right])
    }
}

/// A bind parameter of a compiled query, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Text(String),
    Blob(Vec<u8>),
}

/// The SQL produced by [`compile`]: a `SELECT DISTINCT uri` statement
/// with positional placeholders and their bind values.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<BindValue>,
}

/// One rewritten subtree: a filter fragment plus its binds.
struct Fragment {
    sql: String,
    binds: Vec<BindValue>,
}

/// A stack frame holding the rewritten children of one internal node.
/// Exactly two slots; attaching a third child is the non-binary error.
#[derive(Default)]
struct Frame {
    slots: [Option<Fragment>; 2],
}

impl Frame {
    fn attach(&mut self, fragment: Fragment) -> Result<()> {
        for slot in &mut self.slots {
            if slot.is_none() {
                *slot = Some(fragment);
                return Ok(());
            }
        }
        Err(AppError::unsupported_expression(
            "non-binary expressions are not supported",
        ))
    }

    fn take_pair(&mut self) -> Result<(Fragment, Fragment)> {
        match (self.slots[0].take(), self.slots[1].take()) {
            (Some(left), Some(right)) => Ok((left, right)),
            _ => Err(AppError::unsupported_expression(
                "AND/OR expressions require exactly two operands",
            )),
        }
    }
}

/// Compile a query tree into the repository's SQL filter form.
pub fn compile(query: &UriQuery) -> Result<CompiledQuery> {
    enum Step<'a> {
        Enter(&'a UriQuery),
        Exit(&'a UriQuery),
    }

    // frames[0] collects the finished root fragment
    let mut frames: Vec<Frame> = vec![Frame::default()];
    let mut steps = vec![Step::Enter(query)];
    while let Some(step) = steps.pop() {
        match step {
            Step::Enter(node) => {
                steps.push(Step::Exit(node));
                match node {
                    UriQuery::Indication(_) => {}
                    UriQuery::And(children) | UriQuery::Or(children) => {
                        frames.push(Frame::default());
                        for child in children.iter().rev() {
                            steps.push(Step::Enter(child));
                        }
                    }
                }
            }
            Step::Exit(node) => {
                let fragment = match node {
                    UriQuery::Indication(ind) => rewrite_leaf(ind)?,
                    UriQuery::And(_) | UriQuery::Or(_) => {
                        let operator = match node {
                            UriQuery::And(_) => "AND",
                            _ => "OR",
                        };
                        let mut frame = frames.pop().expect("frame pushed on enter");
                        let (left, right) = frame.take_pair()?;
                        let mut binds = left.binds;
                        binds.extend(right.binds);
                        Fragment {
                            sql: format!("({} {} {})", left.sql, operator, right.sql),
                            binds,
                        }
                    }
                };
                frames
                    .last_mut()
                    .expect("root frame always present")
                    .attach(fragment)?;
            }
        }
    }

    let root = frames
        .pop()
        .and_then(|mut frame| frame.slots[0].take())
        .expect("compile leaves exactly one root fragment");
    Ok(CompiledQuery {
        sql: format!(
            "SELECT DISTINCT r.uri FROM resource r WHERE {}",
            root.sql
        ),
        binds: root.binds,
    })
}

/// Rewrite a leaf indication into the conjunction of per-entry
/// predicates against the indication rows of the joined resource.
fn rewrite_leaf(ind: &Indication) -> Result<Fragment> {
    if ind.is_empty() {
        return Err(AppError::EmptyIndication);
    }
    let mut predicates = Vec::new();
    let mut binds = Vec::new();
    ind.each(|key, value| {
        predicates.push(
            "EXISTS (SELECT 1 FROM indication i \
             WHERE i.resource_id = r.resource_id AND i.key = ? AND i.value = ?)"
                .to_string(),
        );
        binds.push(BindValue::Text(key_as_text(key)?.to_string()));
        binds.push(BindValue::Blob(value.to_vec()));
        Ok(())
    })?;
    let sql = if predicates.len() == 1 {
        predicates.remove(0)
    } else {
        format!("({})", predicates.join(" AND "))
    };
    Ok(Fragment { sql, binds })
}
