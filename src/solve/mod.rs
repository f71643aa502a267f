mod cycles;
mod tree;

pub use cycles::collapse_cyclic_vars;
pub use tree::Resolver;

use std::cmp::Ordering;

use crate::{binding::Binding, ty::Ty};

/// Hooks into the resolution search. The resolver owns one observer and
/// reports structural events as they happen; implementations decide what
/// to do with them.
pub trait SearchObserver {
    fn on_reduce(&mut self, _depth: usize, _constraints: usize) {}
    fn on_branch(&mut self, _depth: usize, _children: usize) {}
    fn on_prune(&mut self, _depth: usize) {}
    fn on_dead_end(&mut self, _depth: usize) {}
    fn on_solution(&mut self, _binding: &Binding) {}
}

/// Observer that does nothing.
pub struct NullObserver;

impl SearchObserver for NullObserver {}

/// Observer that traces the search through the `log` facade.
pub struct LogObserver;

impl SearchObserver for LogObserver {
    fn on_reduce(&mut self, depth: usize, constraints: usize) {
        log::debug!("reduce: depth={}, constraints={}", depth, constraints);
    }

    fn on_branch(&mut self, depth: usize, children: usize) {
        log::debug!("branch: depth={}, children={}", depth, children);
    }

    fn on_prune(&mut self, depth: usize) {
        log::debug!("pruned alternative: depth={}", depth);
    }

    fn on_dead_end(&mut self, depth: usize) {
        log::debug!("dead end: depth={}", depth);
    }

    fn on_solution(&mut self, binding: &Binding) {
        log::debug!("solution: {}", binding);
    }
}

/// Orders complete solutions so the registry can hand back the best one.
pub trait RankingPolicy {
    /// `Greater` means `a` is the better solution.
    fn compare(&self, a: &Binding, b: &Binding) -> Ordering;
}

fn count_wildcards(ty: &Ty) -> usize {
    match ty {
        Ty::Class(_, args) => args.iter().map(count_wildcards).sum(),
        Ty::Array(el) => count_wildcards(el),
        Ty::Wildcard(_, bound) => 1 + count_wildcards(bound),
        Ty::Bottom | Ty::Var(_) => 0,
    }
}

fn count_bottoms(ty: &Ty) -> usize {
    match ty {
        Ty::Class(_, args) => args.iter().map(count_bottoms).sum(),
        Ty::Array(el) => count_bottoms(el),
        Ty::Wildcard(_, bound) => count_bottoms(bound),
        Ty::Bottom => 1,
        Ty::Var(_) => 0,
    }
}

/// Default ranking: prefer the binding with more informative images, then
/// fewer wildcards, then fewer Bottoms.
pub struct DefaultRanking;

impl DefaultRanking {
    fn key(binding: &Binding) -> (usize, usize, usize) {
        let mut informative = 0;
        let mut wildcards = 0;
        let mut bottoms = 0;
        for (_, ty) in binding.iter() {
            if !matches!(ty, Ty::Var(_) | Ty::Bottom) {
                informative += 1;
            }
            wildcards += count_wildcards(ty);
            bottoms += count_bottoms(ty);
        }
        (informative, wildcards, bottoms)
    }
}

impl RankingPolicy for DefaultRanking {
    fn compare(&self, a: &Binding, b: &Binding) -> Ordering {
        let (ia, wa, ba) = Self::key(a);
        let (ib, wb, bb) = Self::key(b);
        ia.cmp(&ib)
            .then(wb.cmp(&wa))
            .then(bb.cmp(&ba))
    }
}

/// Registry of complete solutions found by the search.
pub struct SolutionHolder {
    solutions: Vec<Binding>,
    policy: Box<dyn RankingPolicy>,
}

impl Default for SolutionHolder {
    fn default() -> SolutionHolder {
        SolutionHolder::new(Box::new(DefaultRanking))
    }
}

impl SolutionHolder {
    pub fn new(policy: Box<dyn RankingPolicy>) -> SolutionHolder {
        SolutionHolder {
            solutions: vec![],
            policy,
        }
    }

    pub fn put_solution(&mut self, binding: Binding) {
        if !self.solutions.contains(&binding) {
            self.solutions.push(binding);
        }
    }

    pub fn solutions(&self) -> &[Binding] {
        &self.solutions
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// The highest-ranked solution, if any. Ties keep the earlier find.
    pub fn best_solution(&self) -> Option<&Binding> {
        let mut best: Option<&Binding> = None;
        for b in &self.solutions {
            match best {
                Some(cur) if self.policy.compare(b, cur) != Ordering::Greater => {}
                _ => best = Some(b),
            }
        }
        best
    }
}

#[cfg(test)]
mod holder_tests {
    use super::*;
    use crate::hierarchy::fixture::hierarchy;

    #[test]
    fn test_best_solution_prefers_informative_bindings() {
        let (_, mut tf, cls) = hierarchy();
        let v = tf.next();

        let vague = Binding::singleton(v, Ty::Bottom);
        let informative = Binding::singleton(v, Ty::Class(cls.string, vec![]));

        let mut holder = SolutionHolder::default();
        holder.put_solution(vague.clone());
        holder.put_solution(informative.clone());
        holder.put_solution(vague.clone());

        assert_eq!(holder.solutions().len(), 2);
        assert_eq!(holder.best_solution(), Some(&informative));
    }

    #[test]
    fn test_best_solution_penalizes_wildcards() {
        let (_, mut tf, cls) = hierarchy();
        let v = tf.next();
        let string = Ty::Class(cls.string, vec![]);

        let wild = Binding::singleton(v, Ty::Class(cls.list, vec![Ty::super_wildcard(string.clone())]));
        let plain = Binding::singleton(v, Ty::Class(cls.list, vec![string]));

        let mut holder = SolutionHolder::default();
        holder.put_solution(wild);
        holder.put_solution(plain.clone());
        assert_eq!(holder.best_solution(), Some(&plain));
    }
}
