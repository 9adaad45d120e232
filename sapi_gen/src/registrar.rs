//! Function registrar: accepts one declaration at a time, pulls in its
//! types and stores the lowered signature.

use crate::collect::TypeCollector;
use crate::decl::DeclGraph;
use crate::emitter::{Emitter, FunctionHandle, FunctionRecord};
use crate::error::{GenError, ParamPosition};
use crate::filter::DeclFilter;
use crate::lowering::{infer_direction, Lowering, LoweringContext, ParameterSlot};
use crate::naming::resolve_param_names;
use sapi_types::FunctionDecl;
use tracing::debug;

pub struct FunctionRegistrar<'g> {
    graph: &'g DeclGraph,
    collector: TypeCollector<'g>,
    emitter: Emitter,
    lowering: Box<dyn Lowering>,
}

impl<'g> FunctionRegistrar<'g> {
    pub fn new(graph: &'g DeclGraph, filter: DeclFilter, lowering: Box<dyn Lowering>) -> Self {
        Self {
            graph,
            collector: TypeCollector::new(graph, filter),
            emitter: Emitter::new(),
            lowering,
        }
    }

    pub fn lowering_name(&self) -> &'static str {
        self.lowering.name()
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub fn into_emitter(self) -> Emitter {
        self.emitter
    }

    /// Registers `decl` for exposure.
    ///
    /// A second declaration with an already registered qualified name fails
    /// with `DuplicateFunction` and leaves the first registration untouched.
    /// Any other failure is fatal to the run; types collected before the
    /// failure stay recorded.
    pub fn add(&mut self, decl: &FunctionDecl) -> Result<FunctionHandle, GenError> {
        let qualified_name = decl.qualified_name();
        if self.emitter.has_function(&qualified_name) {
            return Err(GenError::DuplicateFunction { name: qualified_name });
        }

        self.collector.filter().screen_function(decl)?;
        let collected = self.collector.collect(&mut self.emitter, decl)?;

        let (names, _) = resolve_param_names(&decl.params);
        let mut slots = Vec::with_capacity(decl.params.len());
        for (index, (param, name)) in decl.params.iter().zip(names).enumerate() {
            let shape = self.graph.shape(&param.ty).ok_or_else(|| {
                GenError::unmappable(
                    &qualified_name,
                    ParamPosition::Param(index),
                    format!("type '{}' is never declared", param.ty.name),
                )
            })?;
            slots.push(ParameterSlot {
                index,
                name,
                ty: param.ty.clone(),
                direction: infer_direction(&shape, param.direction, &qualified_name, index)?,
            });
        }

        let ctx = LoweringContext {
            graph: self.graph,
            filter: self.collector.filter(),
        };
        let signature = self
            .lowering
            .lower(&ctx, &qualified_name, slots, &decl.return_type)?;

        debug!(
            function = %qualified_name,
            lowering = self.lowering.name(),
            new_types = collected.new_types.len(),
            "registered function"
        );
        self.emitter.record_function(FunctionRecord {
            qualified_name: qualified_name.clone(),
            decl: decl.clone(),
            signature,
            types: collected.referenced,
        });
        self.emitter
            .function_handle(&qualified_name)
            .ok_or(GenError::DuplicateFunction { name: qualified_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowering::{lowering_for, Direction, Marshalling};
    use sapi_types::{DirectionHint, LoweringKind, ParamDecl, QualType, RecordDecl, TypeDecl, TypeDeclKind};

    fn bytes() -> QualType {
        QualType::new("uint8_t").constant().pointer()
    }

    fn header() -> TypeDecl {
        TypeDecl {
            name: "Header".into(),
            namespace: String::new(),
            kind: TypeDeclKind::Struct(RecordDecl::default()),
            comment: None,
        }
    }

    fn buffer_fn(name: &str) -> FunctionDecl {
        FunctionDecl::new(
            name,
            QualType::new("int"),
            vec![ParamDecl::unnamed(bytes()), ParamDecl::unnamed(QualType::new("size_t"))],
        )
    }

    fn registrar_for<'g>(graph: &'g DeclGraph) -> FunctionRegistrar<'g> {
        FunctionRegistrar::new(graph, DeclFilter::default(), lowering_for(LoweringKind::PairedBuffers))
    }

    #[test]
    fn duplicate_registration_keeps_the_first() {
        let first = buffer_fn("F");
        let mut second = FunctionDecl::new("F", QualType::new("void"), vec![]);
        second.params.push(ParamDecl::named("h", QualType::new("Header").pointer()));
        let graph = DeclGraph::from_parts(&[header()], &[first.clone(), second.clone()]).unwrap();
        let mut registrar = registrar_for(&graph);

        let handle = registrar.add(&first).unwrap();
        let err = registrar.add(&second).unwrap_err();
        assert_eq!(err, GenError::DuplicateFunction { name: "F".into() });

        let record = registrar.emitter().function_record(handle);
        assert_eq!(record.decl, first);
        assert_eq!(record.signature.arity(), 2);
        /* the duplicate was rejected before any of its types were collected */
        assert_eq!(registrar.emitter().type_count(), 0);
    }

    #[test]
    fn slots_carry_resolved_names_and_directions() {
        let decl = FunctionDecl::new(
            "ConvertTTFToWOFF2",
            QualType::new("bool"),
            vec![
                ParamDecl::named("data", bytes()),
                ParamDecl::unnamed(QualType::new("size_t")),
                ParamDecl::named("result", QualType::new("uint8_t").pointer()).with_direction(DirectionHint::Out),
                ParamDecl::named("result_length", QualType::new("size_t").pointer()),
            ],
        );
        let graph = DeclGraph::from_parts(&[], &[decl.clone()]).unwrap();
        let mut registrar = registrar_for(&graph);
        let handle = registrar.add(&decl).unwrap();
        let signature = &registrar.emitter().function_record(handle).signature;

        let names: Vec<&str> = signature.params.iter().map(|p| p.slot.name.as_str()).collect();
        assert_eq!(names, ["data", "unnamed1_", "result", "result_length"]);
        let directions: Vec<Direction> = signature.params.iter().map(|p| p.slot.direction).collect();
        assert_eq!(directions, [Direction::In, Direction::In, Direction::Out, Direction::InOut]);
        assert_eq!(signature.primitive_of(0), Some(Marshalling::BufferIn));
        assert_eq!(signature.primitive_of(2), Some(Marshalling::BufferOut));
        assert_eq!(signature.primitive_of(3), Some(Marshalling::ScalarByReference));
    }

    #[test]
    fn screened_functions_are_unsupported() {
        let mut decl = buffer_fn("Printf");
        decl.variadic = true;
        let graph = DeclGraph::from_parts(&[], &[decl.clone()]).unwrap();
        let mut registrar = registrar_for(&graph);
        assert!(matches!(
            registrar.add(&decl),
            Err(GenError::UnsupportedConstruct { decl, .. }) if decl == "Printf"
        ));
        assert_eq!(registrar.emitter().function_count(), 0);
    }

    #[test]
    fn unmappable_parameter_names_function_and_position() {
        let decl = FunctionDecl::new(
            "Take",
            QualType::new("void"),
            vec![
                ParamDecl::named("count", QualType::new("int")),
                ParamDecl::named("header", QualType::new("Header")),
            ],
        );
        let graph = DeclGraph::from_parts(&[header()], &[decl.clone()]).unwrap();
        let mut registrar = registrar_for(&graph);
        match registrar.add(&decl).unwrap_err() {
            GenError::UnmappableParameter { function, position, .. } => {
                assert_eq!(function, "Take");
                assert_eq!(position, ParamPosition::Param(1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!registrar.emitter().has_function("Take"));
    }

    #[test]
    fn shared_types_are_referenced_by_every_user() {
        let with_header = |name: &str| {
            FunctionDecl::new(
                name,
                QualType::new("int"),
                vec![ParamDecl::named("header", QualType::new("Header").constant().pointer())],
            )
        };
        let (f, g) = (with_header("F"), with_header("G"));
        let graph = DeclGraph::from_parts(&[header()], &[f.clone(), g.clone()]).unwrap();
        let mut registrar = registrar_for(&graph);
        let f = registrar.add(&f).unwrap();
        let g = registrar.add(&g).unwrap();
        let emitter = registrar.into_emitter();
        assert_eq!(emitter.type_count(), 1);
        assert_eq!(emitter.function_record(f).types, emitter.function_record(g).types);
    }
}
