//! Dominator tree and dominance frontiers.
//!
//! Iterative dataflow over reverse postorder (Cooper–Harvey–Kennedy), then
//! Cytron's walk for the frontiers: for every merge block, each predecessor
//! climbs the dominator tree up to the block's immediate dominator, picking
//! up the block into every frontier on the way.
//!
//! Expects the CFG caches to be current and every block reachable
//! (`CfgBuild` establishes both).

use rustc_hash::FxHashMap;

use crate::ir::Function;

/// Dominance information for one function. Blocks are identified by label.
#[derive(Debug, Default)]
pub struct Dominance {
    /// Reverse postorder over the CFG, entry first.
    pub rpo: Vec<String>,
    /// Immediate dominator of each block; the entry has none.
    pub idom: FxHashMap<String, String>,
    /// Children in the dominator tree.
    pub children: FxHashMap<String, Vec<String>>,
    /// Dominance frontier of each block.
    pub frontier: FxHashMap<String, Vec<String>>,
}

impl Dominance {
    /// Whether `a` dominates `b` (reflexively).
    pub fn dominates(&self, a: &str, b: &str) -> bool {
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom.get(cur) {
                Some(parent) => cur = parent,
                None => return false,
            }
        }
    }
}

pub fn compute(func: &Function) -> Dominance {
    let rpo = reverse_postorder(func);
    let index: FxHashMap<&str, usize> = rpo
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();

    // idom as rpo indices; entry maps to itself.
    let mut idom: Vec<Option<usize>> = vec![None; rpo.len()];
    idom[0] = Some(0);

    let preds_of: Vec<Vec<usize>> = rpo
        .iter()
        .map(|label| {
            func.get_block(label)
                .map(|b| {
                    b.preds
                        .iter()
                        .filter_map(|p| index.get(p.as_str()).copied())
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for b in 1..rpo.len() {
            let mut new_idom: Option<usize> = None;
            for &p in &preds_of[b] {
                if idom[p].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(&idom, p, cur),
                });
            }
            if let Some(ni) = new_idom {
                if idom[b] != Some(ni) {
                    idom[b] = Some(ni);
                    changed = true;
                }
            }
        }
    }

    let mut dom = Dominance {
        rpo: rpo.clone(),
        ..Dominance::default()
    };
    for (b, parent) in idom.iter().enumerate().skip(1) {
        if let Some(p) = parent {
            dom.idom.insert(rpo[b].clone(), rpo[*p].clone());
            dom.children
                .entry(rpo[*p].clone())
                .or_default()
                .push(rpo[b].clone());
        }
    }

    // Frontiers (Cytron et al.): only merge points contribute.
    for (b, preds) in preds_of.iter().enumerate() {
        if preds.len() < 2 {
            continue;
        }
        let Some(b_idom) = idom[b] else { continue };
        for &p in preds {
            let mut runner = p;
            while runner != b_idom {
                let entry = dom.frontier.entry(rpo[runner].clone()).or_default();
                if !entry.contains(&rpo[b]) {
                    entry.push(rpo[b].clone());
                }
                match idom[runner] {
                    Some(next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }

    dom
}

fn intersect(idom: &[Option<usize>], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a].expect("processed node has idom");
        }
        while b > a {
            b = idom[b].expect("processed node has idom");
        }
    }
    a
}

fn reverse_postorder(func: &Function) -> Vec<String> {
    let mut visited = rustc_hash::FxHashSet::default();
    let mut post = Vec::new();
    // Iterative DFS with an explicit stack of (label, next-successor-index).
    let mut stack: Vec<(String, usize)> = vec![(func.entry.clone(), 0)];
    visited.insert(func.entry.clone());
    while let Some((label, i)) = stack.pop() {
        let succs = func
            .get_block(&label)
            .map(|b| b.succs.clone())
            .unwrap_or_default();
        if i < succs.len() {
            stack.push((label.clone(), i + 1));
            let next = succs[i].clone();
            if visited.insert(next.clone()) {
                stack.push((next, 0));
            }
        } else {
            post.push(label);
        }
    }
    post.reverse();
    post
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Inst, Ty, Value};
    use crate::passes::cfg;

    /// entry -> header; header -> body | exit; body -> header.
    fn loop_cfg() -> Function {
        let mut func = FunctionBuilder::new("t", Ty::Void)
            .block("entry")
            .inst(Inst::Jmp {
                target: "header".into(),
            })
            .block("header")
            .inst(Inst::Br {
                cond: Value::Bool(true),
                true_label: "body".into(),
                false_label: "exit".into(),
            })
            .block("body")
            .inst(Inst::Jmp {
                target: "header".into(),
            })
            .block("exit")
            .inst(Inst::Ret { value: None })
            .build();
        cfg::recompute(&mut func);
        func
    }

    #[test]
    fn test_idom_of_loop() {
        let func = loop_cfg();
        let dom = compute(&func);
        assert_eq!(dom.idom.get("header").map(String::as_str), Some("entry"));
        assert_eq!(dom.idom.get("body").map(String::as_str), Some("header"));
        assert_eq!(dom.idom.get("exit").map(String::as_str), Some("header"));
        assert!(dom.idom.get("entry").is_none());
    }

    #[test]
    fn test_dominates() {
        let func = loop_cfg();
        let dom = compute(&func);
        assert!(dom.dominates("entry", "exit"));
        assert!(dom.dominates("header", "body"));
        assert!(!dom.dominates("body", "exit"));
        assert!(dom.dominates("body", "body"));
    }

    #[test]
    fn test_frontier_of_loop_body() {
        let func = loop_cfg();
        let dom = compute(&func);
        // The back edge makes `header` its own frontier member via `body`.
        assert!(dom.frontier.get("body").unwrap().contains(&"header".to_string()));
        // entry dominates everything: empty frontier.
        assert!(dom.frontier.get("entry").is_none());
    }

    #[test]
    fn test_diamond_frontier() {
        let mut func = FunctionBuilder::new("t", Ty::Void)
            .block("entry")
            .inst(Inst::Br {
                cond: Value::Bool(true),
                true_label: "a".into(),
                false_label: "b".into(),
            })
            .block("a")
            .inst(Inst::Jmp {
                target: "merge".into(),
            })
            .block("b")
            .inst(Inst::Jmp {
                target: "merge".into(),
            })
            .block("merge")
            .inst(Inst::Ret { value: None })
            .build();
        cfg::recompute(&mut func);
        let dom = compute(&func);
        assert_eq!(dom.frontier.get("a").unwrap(), &vec!["merge".to_string()]);
        assert_eq!(dom.frontier.get("b").unwrap(), &vec!["merge".to_string()]);
        assert_eq!(dom.idom.get("merge").map(String::as_str), Some("entry"));
    }
}
