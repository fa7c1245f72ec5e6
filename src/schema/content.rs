//! Content-model matching for element-only and mixed complex types.
//!
//! A particle tree is compiled into a small epsilon-NFA; the validator keeps
//! one [`ContentMatcher`] per open element and feeds it the names of the
//! child elements as they stream in. A top-level `xs:all` gets its own
//! matcher since its members may appear in any order.

use std::sync::Arc;

use super::model::{
    ElementDecl, MaxOccurs, NamespaceConstraint, Particle, QualifiedName, Term, Wildcard,
};

/// Occurrence counts above these limits are matched leniently.
const MAX_EXPANDED_MIN: u32 = 64;
const MAX_EXPANDED_MAX: u32 = 128;
const MAX_GROUP_DEPTH: usize = 16;

/// Looks up the global components a particle tree refers to.
pub trait ComponentResolver {
    fn global_element(&self, name: &QualifiedName) -> Option<Arc<ElementDecl>>;
    fn model_group(&self, name: &QualifiedName) -> Option<Arc<Particle>>;
}

/// What a child element matched.
#[derive(Debug, Clone)]
pub enum Leaf {
    Element(Arc<ElementDecl>),
    Wildcard(Wildcard),
}

impl Leaf {
    fn matches(&self, name: &QualifiedName) -> bool {
        match self {
            Leaf::Element(decl) => decl.name == *name,
            Leaf::Wildcard(wildcard) => wildcard.namespaces.admits(&name.namespace),
        }
    }

    fn describe(&self) -> String {
        match self {
            Leaf::Element(decl) => decl.name.to_string(),
            Leaf::Wildcard(wildcard) => match &wildcard.namespaces {
                NamespaceConstraint::Any => "##any".to_string(),
                NamespaceConstraint::Other(_) => "##other".to_string(),
                NamespaceConstraint::List(list) => list
                    .iter()
                    .map(|ns| if ns.is_empty() { "##local" } else { ns.as_str() })
                    .collect::<Vec<_>>()
                    .join(" "),
            },
        }
    }
}

#[derive(Debug, Default)]
struct State {
    epsilon: Vec<usize>,
    edges: Vec<(usize, usize)>,
}

#[derive(Debug)]
pub struct Automaton {
    states: Vec<State>,
    leaves: Vec<Leaf>,
    start: usize,
    accept: usize,
}

#[derive(Debug)]
pub struct AllModel {
    members: Vec<(Leaf, bool)>,
    optional: bool,
}

/// A compiled content model, shared by every element of the same type.
#[derive(Debug)]
pub enum CompiledModel {
    Automaton(Automaton),
    All(AllModel),
}

pub fn compile_particle<R: ComponentResolver + ?Sized>(particle: &Particle, resolver: &R) -> CompiledModel {
    if let Some((members, optional)) = top_level_all(particle, resolver, 0) {
        let members = members
            .iter()
            .filter_map(|member| {
                let leaf = leaf_for(&member.term, resolver)?;
                Some((leaf, member.min > 0))
            })
            .collect();
        return CompiledModel::All(AllModel { members, optional });
    }

    let mut builder = Builder {
        states: vec![State::default()],
        leaves: Vec::new(),
        resolver,
    };
    let accept = builder.particle(particle, 0, 0);
    CompiledModel::Automaton(Automaton {
        states: builder.states,
        leaves: builder.leaves,
        start: 0,
        accept,
    })
}

fn top_level_all<R: ComponentResolver + ?Sized>(
    particle: &Particle,
    resolver: &R,
    depth: usize,
) -> Option<(Vec<Particle>, bool)> {
    match &particle.term {
        Term::All(members) => Some((members.clone(), particle.min == 0)),
        Term::GroupRef(name) if depth < MAX_GROUP_DEPTH => {
            let group = resolver.model_group(name)?;
            let (members, optional) = top_level_all(&group, resolver, depth + 1)?;
            Some((members, optional || particle.min == 0))
        }
        _ => None,
    }
}

fn leaf_for<R: ComponentResolver + ?Sized>(term: &Term, resolver: &R) -> Option<Leaf> {
    match term {
        Term::Element(decl) => Some(Leaf::Element(decl.clone())),
        Term::ElementRef(name) => Some(Leaf::Element(resolve_element_ref(name, resolver))),
        Term::Any(wildcard) => Some(Leaf::Wildcard(wildcard.clone())),
        _ => None,
    }
}

/// Unresolved references still match their name; their content is unconstrained.
fn resolve_element_ref<R: ComponentResolver + ?Sized>(name: &QualifiedName, resolver: &R) -> Arc<ElementDecl> {
    resolver.global_element(name).unwrap_or_else(|| {
        Arc::new(ElementDecl {
            name: name.clone(),
            type_ref: None,
            nillable: false,
            is_abstract: false,
            default: None,
            fixed: None,
        })
    })
}

struct Builder<'r, R: ?Sized> {
    states: Vec<State>,
    leaves: Vec<Leaf>,
    resolver: &'r R,
}

impl<R: ComponentResolver + ?Sized> Builder<'_, R> {
    fn new_state(&mut self) -> usize {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn epsilon(&mut self, from: usize, to: usize) {
        self.states[from].epsilon.push(to);
    }

    /// Build `particle` starting at `from`; returns the fragment's end state.
    fn particle(&mut self, particle: &Particle, from: usize, depth: usize) -> usize {
        let min = particle.min.min(MAX_EXPANDED_MIN);
        let max = match particle.max {
            MaxOccurs::Bounded(max) if max <= MAX_EXPANDED_MAX => Some(max.max(min)),
            MaxOccurs::Bounded(_) | MaxOccurs::Unbounded => None,
        };
        if max == Some(0) {
            return from;
        }

        let mut current = from;
        for _ in 0..min {
            current = self.term(&particle.term, current, depth);
        }

        match max {
            None => {
                let head = self.new_state();
                self.epsilon(current, head);
                let end = self.term(&particle.term, head, depth);
                self.epsilon(end, head);
                head
            }
            Some(max) => {
                let exit = self.new_state();
                for _ in min..max {
                    self.epsilon(current, exit);
                    current = self.term(&particle.term, current, depth);
                }
                self.epsilon(current, exit);
                exit
            }
        }
    }

    fn leaf(&mut self, leaf: Leaf, from: usize) -> usize {
        self.leaves.push(leaf);
        let index = self.leaves.len() - 1;
        let to = self.new_state();
        self.states[from].edges.push((index, to));
        to
    }

    fn term(&mut self, term: &Term, from: usize, depth: usize) -> usize {
        match term {
            Term::Element(_) | Term::ElementRef(_) | Term::Any(_) => match leaf_for(term, self.resolver) {
                Some(leaf) => self.leaf(leaf, from),
                None => from,
            },
            Term::Sequence(items) => items
                .iter()
                .fold(from, |current, item| self.particle(item, current, depth)),
            Term::Choice(items) => {
                let to = self.new_state();
                for item in items {
                    let end = self.particle(item, from, depth);
                    self.epsilon(end, to);
                }
                to
            }
            // Nested all groups only occur in invalid schemas; accept members in any order.
            Term::All(items) => {
                let head = self.new_state();
                self.epsilon(from, head);
                for item in items {
                    let end = self.term(&item.term, head, depth);
                    self.epsilon(end, head);
                }
                head
            }
            Term::GroupRef(name) => {
                if depth >= MAX_GROUP_DEPTH {
                    return from;
                }
                match self.resolver.model_group(name) {
                    Some(group) => self.particle(&group, from, depth + 1),
                    None => from,
                }
            }
        }
    }
}

impl Automaton {
    fn closure(&self, seeds: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut visited = vec![false; self.states.len()];
        let mut stack: Vec<usize> = seeds.into_iter().collect();
        let mut result = Vec::new();
        while let Some(state) = stack.pop() {
            if visited[state] {
                continue;
            }
            visited[state] = true;
            result.push(state);
            stack.extend(self.states[state].epsilon.iter().copied());
        }
        result.sort_unstable();
        result
    }
}

/// Matching state for one open element.
#[derive(Debug)]
pub enum ContentMatcher {
    Automaton {
        model: Arc<CompiledModel>,
        current: Vec<usize>,
    },
    All {
        model: Arc<CompiledModel>,
        seen: Vec<bool>,
    },
}

impl ContentMatcher {
    pub fn new(model: Arc<CompiledModel>) -> Self {
        match model.as_ref() {
            CompiledModel::Automaton(automaton) => {
                let current = automaton.closure([automaton.start]);
                ContentMatcher::Automaton { model, current }
            }
            CompiledModel::All(all) => {
                let seen = vec![false; all.members.len()];
                ContentMatcher::All { model, seen }
            }
        }
    }

    /// Advance past a child element. On a mismatch the state is left untouched.
    pub fn step(&mut self, name: &QualifiedName) -> Option<Leaf> {
        match self {
            ContentMatcher::Automaton { model, current } => {
                let CompiledModel::Automaton(automaton) = model.as_ref() else {
                    return None;
                };
                let edges: Vec<(usize, usize)> = current
                    .iter()
                    .flat_map(|&state| automaton.states[state].edges.iter().copied())
                    .filter(|&(leaf, _)| automaton.leaves[leaf].matches(name))
                    .collect();

                // Declared elements take precedence over wildcards.
                let declared: Vec<(usize, usize)> = edges
                    .iter()
                    .copied()
                    .filter(|&(leaf, _)| matches!(automaton.leaves[leaf], Leaf::Element(_)))
                    .collect();
                let chosen = if declared.is_empty() { edges } else { declared };
                let &(first_leaf, _) = chosen.first()?;

                let leaf = automaton.leaves[first_leaf].clone();
                *current = automaton.closure(chosen.into_iter().map(|(_, target)| target));
                Some(leaf)
            }
            ContentMatcher::All { model, seen } => {
                let CompiledModel::All(all) = model.as_ref() else {
                    return None;
                };
                let index = all
                    .members
                    .iter()
                    .enumerate()
                    .position(|(i, (leaf, _))| !seen[i] && leaf.matches(name))?;
                seen[index] = true;
                Some(all.members[index].0.clone())
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            ContentMatcher::Automaton { model, current } => match model.as_ref() {
                CompiledModel::Automaton(automaton) => current.contains(&automaton.accept),
                CompiledModel::All(_) => true,
            },
            ContentMatcher::All { model, seen } => match model.as_ref() {
                CompiledModel::All(all) => {
                    let nothing_seen = seen.iter().all(|s| !s);
                    (all.optional && nothing_seen)
                        || all
                            .members
                            .iter()
                            .zip(seen.iter())
                            .all(|((_, required), seen)| *seen || !required)
                }
                CompiledModel::Automaton(_) => true,
            },
        }
    }

    /// Names acceptable next, in model order without duplicates.
    pub fn expected(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: String| {
            if !names.contains(&name) {
                names.push(name);
            }
        };
        match self {
            ContentMatcher::Automaton { model, current } => {
                if let CompiledModel::Automaton(automaton) = model.as_ref() {
                    let mut edges: Vec<usize> = current
                        .iter()
                        .flat_map(|&state| automaton.states[state].edges.iter().map(|&(leaf, _)| leaf))
                        .collect();
                    edges.sort_unstable();
                    for leaf in edges {
                        push(automaton.leaves[leaf].describe());
                    }
                }
            }
            ContentMatcher::All { model, seen } => {
                if let CompiledModel::All(all) = model.as_ref() {
                    for ((leaf, _), seen) in all.members.iter().zip(seen.iter()) {
                        if !seen {
                            push(leaf.describe());
                        }
                    }
                }
            }
        }
        names
    }

    /// `" List of possible elements expected: '...'."`, or empty when nothing is expected.
    pub fn expected_suffix(&self) -> String {
        let expected = self.expected();
        if expected.is_empty() {
            String::new()
        } else {
            format!(
                " List of possible elements expected: '{}'.",
                expected.join(", ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::ProcessContents;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Globals {
        elements: HashMap<QualifiedName, Arc<ElementDecl>>,
        groups: HashMap<QualifiedName, Arc<Particle>>,
    }

    impl ComponentResolver for Globals {
        fn global_element(&self, name: &QualifiedName) -> Option<Arc<ElementDecl>> {
            self.elements.get(name).cloned()
        }

        fn model_group(&self, name: &QualifiedName) -> Option<Arc<Particle>> {
            self.groups.get(name).cloned()
        }
    }

    fn element(local: &str, min: u32, max: MaxOccurs) -> Particle {
        Particle {
            min,
            max,
            term: Term::Element(Arc::new(ElementDecl {
                name: QualifiedName::new("", local),
                type_ref: None,
                nillable: false,
                is_abstract: false,
                default: None,
                fixed: None,
            })),
        }
    }

    fn name(local: &str) -> QualifiedName {
        QualifiedName::new("", local)
    }

    fn matcher(particle: Particle, globals: &Globals) -> ContentMatcher {
        ContentMatcher::new(Arc::new(compile_particle(&particle, globals)))
    }

    #[test]
    fn test_sequence_matching() {
        let model = Particle::once(Term::Sequence(vec![
            element("a", 1, MaxOccurs::Bounded(1)),
            element("b", 0, MaxOccurs::Unbounded),
            element("c", 1, MaxOccurs::Bounded(1)),
        ]));
        let globals = Globals::default();
        let mut m = matcher(model, &globals);

        assert!(!m.is_complete());
        assert_eq!(m.expected(), vec!["a"]);
        assert!(m.step(&name("a")).is_some());
        assert!(m.step(&name("b")).is_some());
        assert!(m.step(&name("b")).is_some());
        assert_eq!(m.expected(), vec!["b", "c"]);
        assert!(m.step(&name("a")).is_none());
        assert!(m.step(&name("c")).is_some());
        assert!(m.is_complete());
        assert!(m.expected().is_empty());
    }

    #[test]
    fn test_choice_with_bounded_repeat() {
        let model = Particle {
            min: 1,
            max: MaxOccurs::Bounded(2),
            term: Term::Choice(vec![
                element("x", 1, MaxOccurs::Bounded(1)),
                element("y", 1, MaxOccurs::Bounded(1)),
            ]),
        };
        let globals = Globals::default();
        let mut m = matcher(model, &globals);

        assert_eq!(m.expected_suffix(), " List of possible elements expected: 'x, y'.");
        assert!(m.step(&name("y")).is_some());
        assert!(m.is_complete());
        assert!(m.step(&name("x")).is_some());
        assert!(m.step(&name("x")).is_none());
        assert!(m.is_complete());
    }

    #[test]
    fn test_failed_step_keeps_state() {
        let model = Particle::once(Term::Sequence(vec![
            element("a", 1, MaxOccurs::Bounded(1)),
            element("b", 1, MaxOccurs::Bounded(1)),
        ]));
        let globals = Globals::default();
        let mut m = matcher(model, &globals);

        assert!(m.step(&name("a")).is_some());
        assert!(m.step(&name("zzz")).is_none());
        assert!(m.step(&name("b")).is_some());
        assert!(m.is_complete());
    }

    #[test]
    fn test_group_and_element_refs() {
        let mut globals = Globals::default();
        let item = element("item", 1, MaxOccurs::Bounded(1));
        if let Term::Element(decl) = &item.term {
            globals.elements.insert(name("item"), decl.clone());
        }
        globals.groups.insert(
            name("items"),
            Arc::new(Particle::once(Term::Sequence(vec![Particle {
                min: 1,
                max: MaxOccurs::Unbounded,
                term: Term::ElementRef(name("item")),
            }]))),
        );

        let mut m = matcher(Particle::once(Term::GroupRef(name("items"))), &globals);
        assert!(!m.is_complete());
        match m.step(&name("item")) {
            Some(Leaf::Element(decl)) => assert_eq!(decl.name, name("item")),
            other => panic!("expected element leaf, got {:?}", other),
        }
        assert!(m.is_complete());
    }

    #[test]
    fn test_wildcard_namespace_constraint() {
        let model = Particle {
            min: 0,
            max: MaxOccurs::Unbounded,
            term: Term::Any(Wildcard {
                namespaces: NamespaceConstraint::Other("urn:a".to_string()),
                process: ProcessContents::Lax,
            }),
        };
        let globals = Globals::default();
        let mut m = matcher(model, &globals);

        assert!(matches!(
            m.step(&QualifiedName::new("urn:b", "x")),
            Some(Leaf::Wildcard(_))
        ));
        assert!(m.step(&QualifiedName::new("urn:a", "x")).is_none());
        assert!(m.step(&name("local")).is_none());
    }

    #[test]
    fn test_all_group_any_order() {
        let model = Particle::once(Term::All(vec![
            element("a", 1, MaxOccurs::Bounded(1)),
            element("b", 0, MaxOccurs::Bounded(1)),
            element("c", 1, MaxOccurs::Bounded(1)),
        ]));
        let globals = Globals::default();
        let mut m = matcher(model, &globals);

        assert!(m.step(&name("c")).is_some());
        assert!(!m.is_complete());
        assert_eq!(m.expected(), vec!["a", "b"]);
        assert!(m.step(&name("c")).is_none());
        assert!(m.step(&name("a")).is_some());
        assert!(m.is_complete());
    }

    #[test]
    fn test_large_occurrence_counts_are_lenient() {
        let model = element("row", 0, MaxOccurs::Bounded(10_000));
        let globals = Globals::default();
        let mut m = matcher(model, &globals);
        for _ in 0..500 {
            assert!(m.step(&name("row")).is_some());
        }
        assert!(m.is_complete());
    }
}
