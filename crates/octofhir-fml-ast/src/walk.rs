//! Traversal over every node of a structure map

use crate::{
    DependentExpression, FhirStructureMap, FmlExpressionSource, FmlExpressionTarget, FmlNode,
    FpExpression, FpInvocation, GroupDeclaration, GroupExpression, Invocation, Node, Transform,
};

impl FhirStructureMap {
    /// Call `f` with the source information of every node in the map, parents before children
    pub fn for_each_node(&self, f: &mut dyn FnMut(&FmlNode)) {
        for decl in self.metadata.values() {
            f(&decl.base);
        }
        for cm in self.concept_maps.values() {
            f(&cm.base);
            for prefix in cm.prefixes.values() {
                f(&prefix.base);
            }
            for mapping in &cm.mappings {
                f(&mapping.base);
            }
        }
        if let Some(map) = &self.map {
            f(&map.base);
        }
        for decl in self.structures.values() {
            f(&decl.base);
        }
        for decl in self.imports.values() {
            f(&decl.base);
        }
        for decl in self.constants.values() {
            f(&decl.base);
            walk_expression(&decl.expression, f);
        }
        for group in self.groups.values() {
            walk_group(group, f);
        }
    }

    /// Every node paired with its parent node, for containment checks
    pub fn node_pairs(&self) -> Vec<(FmlNode, FmlNode)> {
        let mut pairs = Vec::new();
        for group in self.groups.values() {
            let mut children = Vec::new();
            walk_group_children(group, &mut |n| children.push(n.clone()));
            pairs.extend(children.into_iter().map(|c| (group.base.clone(), c)));
        }
        for decl in self.constants.values() {
            pairs.push((decl.base.clone(), decl.expression.base.clone()));
            collect_expression_pairs(&decl.expression, &mut pairs);
        }
        pairs
    }
}

fn walk_group(group: &Node<GroupDeclaration>, f: &mut dyn FnMut(&FmlNode)) {
    f(&group.base);
    walk_group_children(group, f);
}

fn walk_group_children(group: &Node<GroupDeclaration>, f: &mut dyn FnMut(&FmlNode)) {
    for param in &group.parameters {
        f(&param.base);
        if let Some(ty) = &param.type_identifier {
            f(&ty.base);
        }
    }
    if let Some(extends) = &group.extends {
        f(&extends.base);
    }
    for rule in &group.rules {
        walk_rule(rule, f);
    }
}

/// Visit a rule and everything below it
pub fn walk_rule(rule: &Node<GroupExpression>, f: &mut dyn FnMut(&FmlNode)) {
    f(&rule.base);
    match &rule.inner {
        GroupExpression::SimpleCopy(copy) => {
            f(&copy.source.base);
            f(&copy.target.base);
            if let Some(name) = &copy.name {
                f(&name.base);
            }
        }
        GroupExpression::FhirPath(stmt) => walk_expression(&stmt.expression, f),
        GroupExpression::Mapping(mapping) => {
            for source in &mapping.sources {
                walk_source(source, f);
            }
            for target in &mapping.targets {
                walk_target(target, f);
            }
            if let Some(dependent) = &mapping.dependent {
                walk_dependent(dependent, f);
            }
            if let Some(name) = &mapping.name {
                f(&name.base);
            }
        }
    }
}

fn walk_source(source: &Node<FmlExpressionSource>, f: &mut dyn FnMut(&FmlNode)) {
    f(&source.base);
    f(&source.identifier.base);
    for node in [&source.type_identifier, &source.alias].into_iter().flatten() {
        f(&node.base);
    }
    if let Some(card) = &source.cardinality {
        f(&card.base);
    }
    for expr in [
        &source.default_value,
        &source.where_clause,
        &source.check_clause,
        &source.log_expression,
    ]
    .into_iter()
    .flatten()
    {
        walk_expression(expr, f);
    }
}

fn walk_target(target: &Node<FmlExpressionTarget>, f: &mut dyn FnMut(&FmlNode)) {
    f(&target.base);
    if let Some(identifier) = &target.identifier {
        f(&identifier.base);
    }
    if let Some(transform) = &target.transform {
        f(&transform.base);
        match &transform.inner {
            Transform::Invocation(invocation) => walk_invocation_args(invocation, f),
            Transform::Expression(expr) => walk_expression(expr, f),
            Transform::Literal(_) | Transform::Identifier(_) => {}
        }
    }
    if let Some(alias) = &target.alias {
        f(&alias.base);
    }
}

fn walk_dependent(dependent: &Node<DependentExpression>, f: &mut dyn FnMut(&FmlNode)) {
    f(&dependent.base);
    for invocation in &dependent.invocations {
        f(&invocation.base);
        walk_invocation_args(invocation, f);
    }
    for rule in &dependent.rules {
        walk_rule(rule, f);
    }
}

fn walk_invocation_args(invocation: &Invocation, f: &mut dyn FnMut(&FmlNode)) {
    for arg in &invocation.arguments {
        f(&arg.base);
    }
}

/// Visit an expression and all of its sub-expressions
pub fn walk_expression(expr: &Node<FpExpression>, f: &mut dyn FnMut(&FmlNode)) {
    f(&expr.base);
    match &expr.inner {
        FpExpression::Invocation(inv) => {
            walk_expression(&inv.target, f);
            f(&inv.invocation.base);
            if let FpInvocation::Function(func) = &inv.invocation.inner {
                for arg in &func.arguments {
                    walk_expression(arg, f);
                }
            }
        }
        FpExpression::Type(t) => {
            walk_expression(&t.operand, f);
            f(&t.type_specifier.base);
        }
        other => {
            for child in other.children() {
                walk_expression(child, f);
            }
        }
    }
}

fn collect_expression_pairs(expr: &Node<FpExpression>, pairs: &mut Vec<(FmlNode, FmlNode)>) {
    for child in expr.children() {
        pairs.push((expr.base.clone(), child.base.clone()));
        collect_expression_pairs(child, pairs);
    }
}
