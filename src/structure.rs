// src/structure.rs
//
// Fixed-point resolution of an employee's salary structure. Rules are
// evaluated over a dependency graph where nodes are components and edges
// are percentage dependencies; the pass loop is bounded by the rule count,
// which is a safe upper bound for any DAG of that size.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    CalcMethod, ComponentId, ComponentKind, EmployeeId, NewStructureRule, RuleId, SalaryComponent,
    StructureRule, round_money,
};

// --- Error Types ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("no salary structure defined for employee {employee_id}")]
    NotDefined { employee_id: EmployeeId },
    #[error(
        "could not resolve salary structure: circular dependency or missing base value; \
         unresolved components: {}",
        components.join(", ")
    )]
    Unresolvable { components: Vec<String> },
}

/// Validation failures of a structure submission. Checked synchronously
/// before any resolver work or store write begins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("unknown salary component id {0}")]
    UnknownComponent(ComponentId),
    #[error("component id {0} is assigned more than once")]
    DuplicateComponent(ComponentId),
    #[error("value for component id {0} must not be negative")]
    NegativeValue(ComponentId),
    #[error("dependencies are only valid on Percentage rules (component id {0})")]
    DependenciesOnFlat(ComponentId),
    #[error("Percentage rule for component id {0} must list at least one dependency")]
    MissingDependencies(ComponentId),
    #[error("component id {0} lists itself as a dependency")]
    SelfDependency(ComponentId),
    #[error(
        "dependency {dependency} of component id {component} is not part of the submitted structure"
    )]
    ForeignDependency {
        component: ComponentId,
        dependency: ComponentId,
    },
}

// --- Resolution output ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedComponent {
    pub component_id: ComponentId,
    pub name: String,
    pub kind: ComponentKind,
    pub amount: Decimal,
    pub is_days_based: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StructureTotals {
    pub earnings: Decimal,
    pub deductions: Decimal,
    pub net: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStructure {
    pub breakdown: Vec<ResolvedComponent>,
    pub totals: StructureTotals,
}

/// Resolves every rule of a structure to a concrete amount.
///
/// Flat rules resolve immediately; Percentage rules resolve once all of
/// their dependency components carry a resolved amount, to
/// `sum(dependency amounts) * value / 100`. Rules are visited in ascending
/// rule-id order within each pass, so resolution is deterministic for a
/// fixed rule set regardless of fetch order. Amounts are rounded to two
/// decimals before they are summed into the totals.
pub fn resolve_structure(
    employee_id: EmployeeId,
    rules: &[StructureRule],
) -> Result<ResolvedStructure, StructureError> {
    if rules.is_empty() {
        return Err(StructureError::NotDefined { employee_id });
    }

    let mut ordered: Vec<&StructureRule> = rules.iter().collect();
    ordered.sort_by_key(|r| r.id);

    let mut amounts: HashMap<ComponentId, Decimal> = HashMap::new();
    let mut resolved: HashSet<RuleId> = HashSet::new();

    let max_passes = ordered.len();
    for pass in 0..max_passes {
        let mut progressed = false;

        for rule in &ordered {
            if resolved.contains(&rule.id) {
                continue;
            }
            match &rule.method {
                CalcMethod::Flat { value } => {
                    amounts.insert(rule.component.id, *value);
                    resolved.insert(rule.id);
                    progressed = true;
                }
                CalcMethod::Percentage {
                    value,
                    dependencies,
                } => {
                    if dependencies.iter().all(|dep| amounts.contains_key(dep)) {
                        let base: Decimal = dependencies.iter().map(|dep| amounts[dep]).sum();
                        amounts.insert(rule.component.id, base * *value / dec!(100));
                        resolved.insert(rule.id);
                        progressed = true;
                    }
                }
            }
        }

        debug!(
            "structure resolution pass {} for employee {}: {}/{} rules resolved",
            pass + 1,
            employee_id,
            resolved.len(),
            ordered.len()
        );

        // A pass with no new resolutions means the remainder is cyclic or
        // depends on a component with no rule; further passes cannot help.
        if !progressed || resolved.len() == ordered.len() {
            break;
        }
    }

    if resolved.len() < ordered.len() {
        let components = ordered
            .iter()
            .filter(|r| !resolved.contains(&r.id))
            .map(|r| r.component.name.clone())
            .collect();
        return Err(StructureError::Unresolvable { components });
    }

    let mut breakdown = Vec::with_capacity(ordered.len());
    let mut earnings = Decimal::ZERO;
    let mut deductions = Decimal::ZERO;

    for rule in &ordered {
        let amount = round_money(amounts[&rule.component.id]);
        match rule.component.kind {
            ComponentKind::Earning => earnings += amount,
            ComponentKind::Deduction => deductions += amount,
        }
        breakdown.push(ResolvedComponent {
            component_id: rule.component.id,
            name: rule.component.name.clone(),
            kind: rule.component.kind,
            amount,
            is_days_based: rule.component.is_days_based,
        });
    }

    Ok(ResolvedStructure {
        breakdown,
        totals: StructureTotals {
            earnings,
            deductions,
            net: earnings - deductions,
        },
    })
}

// --- Structure submissions ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CalcKind {
    Flat,
    Percentage,
}

/// One rule of a structure replacement payload. An empty payload is valid
/// and clears the employee's structure.
#[derive(Debug, Clone, Deserialize)]
pub struct StructureRuleSubmission {
    pub component_id: ComponentId,
    pub calculation_type: CalcKind,
    pub value: Decimal,
    #[serde(default)]
    pub dependencies: Option<Vec<ComponentId>>,
}

/// Validates a structure submission and converts it into store-ready rows.
///
/// Dependency ids must reference components assigned by the same submitted
/// structure; ids pointing anywhere else are rejected before any write.
pub fn build_structure(
    employee_id: EmployeeId,
    submissions: &[StructureRuleSubmission],
    known_components: &[SalaryComponent],
) -> Result<Vec<NewStructureRule>, SubmissionError> {
    let known: BTreeSet<ComponentId> = known_components.iter().map(|c| c.id).collect();
    let mut assigned: BTreeSet<ComponentId> = BTreeSet::new();

    for sub in submissions {
        if !known.contains(&sub.component_id) {
            return Err(SubmissionError::UnknownComponent(sub.component_id));
        }
        if !assigned.insert(sub.component_id) {
            return Err(SubmissionError::DuplicateComponent(sub.component_id));
        }
        if sub.value < Decimal::ZERO {
            return Err(SubmissionError::NegativeValue(sub.component_id));
        }
        match sub.calculation_type {
            CalcKind::Flat => {
                if sub.dependencies.as_ref().is_some_and(|d| !d.is_empty()) {
                    return Err(SubmissionError::DependenciesOnFlat(sub.component_id));
                }
            }
            CalcKind::Percentage => {
                let deps = sub.dependencies.as_deref().unwrap_or_default();
                if deps.is_empty() {
                    return Err(SubmissionError::MissingDependencies(sub.component_id));
                }
            }
        }
    }

    // Referential check needs the full assigned set, so it runs second.
    for sub in submissions {
        if sub.calculation_type == CalcKind::Percentage {
            for dep in sub.dependencies.as_deref().unwrap_or_default() {
                if *dep == sub.component_id {
                    return Err(SubmissionError::SelfDependency(sub.component_id));
                }
                if !assigned.contains(dep) {
                    return Err(SubmissionError::ForeignDependency {
                        component: sub.component_id,
                        dependency: *dep,
                    });
                }
            }
        }
    }

    Ok(submissions
        .iter()
        .map(|sub| NewStructureRule {
            employee_id,
            component_id: sub.component_id,
            method: match sub.calculation_type {
                CalcKind::Flat => CalcMethod::Flat { value: sub.value },
                CalcKind::Percentage => CalcMethod::Percentage {
                    value: sub.value,
                    dependencies: sub
                        .dependencies
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .copied()
                        .collect(),
                },
            },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(id: ComponentId, name: &str, kind: ComponentKind) -> SalaryComponent {
        SalaryComponent {
            id,
            name: name.to_string(),
            kind,
            is_days_based: false,
            is_base_component: false,
        }
    }

    fn flat(id: RuleId, component: SalaryComponent, value: Decimal) -> StructureRule {
        StructureRule {
            id,
            employee_id: 1,
            component,
            method: CalcMethod::Flat { value },
        }
    }

    fn pct(
        id: RuleId,
        component: SalaryComponent,
        value: Decimal,
        deps: &[ComponentId],
    ) -> StructureRule {
        StructureRule {
            id,
            employee_id: 1,
            component,
            method: CalcMethod::Percentage {
                value,
                dependencies: deps.iter().copied().collect(),
            },
        }
    }

    #[test]
    fn resolves_flat_and_percentage_chain() {
        let rules = vec![
            flat(1, component(10, "Basic", ComponentKind::Earning), dec!(1000)),
            pct(2, component(11, "HRA", ComponentKind::Earning), dec!(50), &[10]),
            pct(
                3,
                component(12, "Bonus", ComponentKind::Earning),
                dec!(10),
                &[10, 11],
            ),
        ];

        let resolved = resolve_structure(1, &rules).unwrap();
        let amounts: Vec<Decimal> = resolved.breakdown.iter().map(|c| c.amount).collect();
        assert_eq!(amounts, vec![dec!(1000.00), dec!(500.00), dec!(150.00)]);
        assert_eq!(resolved.totals.earnings, dec!(1650.00));
        assert_eq!(resolved.totals.deductions, Decimal::ZERO);
        assert_eq!(resolved.totals.net, dec!(1650.00));
    }

    #[test]
    fn resolution_is_deterministic_across_fetch_order() {
        let rules = vec![
            pct(
                3,
                component(12, "Bonus", ComponentKind::Earning),
                dec!(10),
                &[10, 11],
            ),
            flat(1, component(10, "Basic", ComponentKind::Earning), dec!(1000)),
            pct(2, component(11, "HRA", ComponentKind::Earning), dec!(50), &[10]),
        ];
        let mut reversed = rules.clone();
        reversed.reverse();

        let a = resolve_structure(1, &rules).unwrap();
        let b = resolve_structure(1, &reversed).unwrap();
        assert_eq!(a, b);
        // Breakdown order follows rule ids, not input order.
        assert_eq!(a.breakdown[0].name, "Basic");
        assert_eq!(a.breakdown[2].name, "Bonus");
    }

    #[test]
    fn cycle_names_both_unresolved_components() {
        let rules = vec![
            pct(1, component(10, "A", ComponentKind::Earning), dec!(50), &[11]),
            pct(2, component(11, "B", ComponentKind::Earning), dec!(50), &[10]),
        ];

        let err = resolve_structure(1, &rules).unwrap_err();
        match err {
            StructureError::Unresolvable { components } => {
                assert_eq!(components, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected Unresolvable, got {other:?}"),
        }
    }

    #[test]
    fn missing_base_is_unresolvable() {
        // Dependency id 99 has no rule in this structure.
        let rules = vec![pct(
            1,
            component(10, "HRA", ComponentKind::Earning),
            dec!(40),
            &[99],
        )];

        let err = resolve_structure(1, &rules).unwrap_err();
        assert!(matches!(err, StructureError::Unresolvable { ref components }
            if components == &["HRA".to_string()]));
    }

    #[test]
    fn empty_structure_is_not_defined() {
        let err = resolve_structure(42, &[]).unwrap_err();
        assert_eq!(err, StructureError::NotDefined { employee_id: 42 });
    }

    #[test]
    fn deductions_reduce_net() {
        let rules = vec![
            flat(1, component(10, "Basic", ComponentKind::Earning), dec!(2000)),
            pct(
                2,
                component(11, "PF", ComponentKind::Deduction),
                dec!(12),
                &[10],
            ),
        ];

        let resolved = resolve_structure(1, &rules).unwrap();
        assert_eq!(resolved.totals.earnings, dec!(2000.00));
        assert_eq!(resolved.totals.deductions, dec!(240.00));
        assert_eq!(resolved.totals.net, dec!(1760.00));
    }

    #[test]
    fn amounts_are_rounded_before_totalling() {
        // 33.333% of 1000 = 333.33 after rounding; the total must use the
        // rounded figure, not 333.33333...
        let rules = vec![
            flat(1, component(10, "Basic", ComponentKind::Earning), dec!(1000)),
            pct(
                2,
                component(11, "Allowance", ComponentKind::Earning),
                dec!(33.333),
                &[10],
            ),
        ];

        let resolved = resolve_structure(1, &rules).unwrap();
        assert_eq!(resolved.breakdown[1].amount, dec!(333.33));
        assert_eq!(resolved.totals.earnings, dec!(1333.33));
    }

    // --- Submission validation ---

    fn catalogue() -> Vec<SalaryComponent> {
        vec![
            component(10, "Basic", ComponentKind::Earning),
            component(11, "HRA", ComponentKind::Earning),
            component(12, "PF", ComponentKind::Deduction),
        ]
    }

    fn submission(
        component_id: ComponentId,
        calculation_type: CalcKind,
        value: Decimal,
        deps: Option<Vec<ComponentId>>,
    ) -> StructureRuleSubmission {
        StructureRuleSubmission {
            component_id,
            calculation_type,
            value,
            dependencies: deps,
        }
    }

    #[test]
    fn valid_submission_builds_rules() {
        let subs = vec![
            submission(10, CalcKind::Flat, dec!(1000), None),
            submission(11, CalcKind::Percentage, dec!(50), Some(vec![10])),
        ];

        let rules = build_structure(7, &subs, &catalogue()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].employee_id, 7);
        assert_eq!(
            rules[1].method,
            CalcMethod::Percentage {
                value: dec!(50),
                dependencies: [10].into_iter().collect(),
            }
        );
    }

    #[test]
    fn empty_submission_clears_structure() {
        assert_eq!(build_structure(7, &[], &catalogue()).unwrap(), vec![]);
    }

    #[test]
    fn rejects_unknown_component() {
        let subs = vec![submission(99, CalcKind::Flat, dec!(100), None)];
        assert_eq!(
            build_structure(7, &subs, &catalogue()).unwrap_err(),
            SubmissionError::UnknownComponent(99)
        );
    }

    #[test]
    fn rejects_duplicate_component_assignment() {
        let subs = vec![
            submission(10, CalcKind::Flat, dec!(100), None),
            submission(10, CalcKind::Flat, dec!(200), None),
        ];
        assert_eq!(
            build_structure(7, &subs, &catalogue()).unwrap_err(),
            SubmissionError::DuplicateComponent(10)
        );
    }

    #[test]
    fn rejects_dependency_outside_submitted_structure() {
        // Component 12 exists in the catalogue but is not part of this
        // employee's submitted structure.
        let subs = vec![
            submission(10, CalcKind::Flat, dec!(1000), None),
            submission(11, CalcKind::Percentage, dec!(50), Some(vec![12])),
        ];
        assert_eq!(
            build_structure(7, &subs, &catalogue()).unwrap_err(),
            SubmissionError::ForeignDependency {
                component: 11,
                dependency: 12,
            }
        );
    }

    #[test]
    fn rejects_self_dependency() {
        let subs = vec![submission(10, CalcKind::Percentage, dec!(50), Some(vec![10]))];
        assert_eq!(
            build_structure(7, &subs, &catalogue()).unwrap_err(),
            SubmissionError::SelfDependency(10)
        );
    }

    #[test]
    fn rejects_dependencies_on_flat_and_missing_on_percentage() {
        let on_flat = vec![submission(10, CalcKind::Flat, dec!(100), Some(vec![11]))];
        assert_eq!(
            build_structure(7, &on_flat, &catalogue()).unwrap_err(),
            SubmissionError::DependenciesOnFlat(10)
        );

        let missing = vec![submission(11, CalcKind::Percentage, dec!(50), None)];
        assert_eq!(
            build_structure(7, &missing, &catalogue()).unwrap_err(),
            SubmissionError::MissingDependencies(11)
        );
    }

    #[test]
    fn rejects_negative_value() {
        let subs = vec![submission(10, CalcKind::Flat, dec!(-5), None)];
        assert_eq!(
            build_structure(7, &subs, &catalogue()).unwrap_err(),
            SubmissionError::NegativeValue(10)
        );
    }
}
