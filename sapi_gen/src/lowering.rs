//! Lowering: maps each parameter of a function onto one of the marshalling
//! primitives the sandbox runtime understands.
//!
//! Getting a direction wrong corrupts data silently on the other side of the
//! boundary, so every shape that is not covered here is rejected instead of
//! guessed.

use crate::decl::builtins::is_length_type;
use crate::decl::{Category, DeclGraph, ScalarKind, TypeShape};
use crate::error::{GenError, ParamPosition};
use crate::filter::{Classification, DeclFilter};
use sapi_types::{DirectionHint, LoweringKind, QualType};
use serde_derive::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Marshalling {
    ScalarByValue,
    ScalarByReference,
    BufferIn,
    BufferOut,
    BufferInOut,
}

impl Marshalling {
    pub fn buffer(direction: Direction) -> Self {
        match direction {
            Direction::In => Marshalling::BufferIn,
            Direction::Out => Marshalling::BufferOut,
            Direction::InOut => Marshalling::BufferInOut,
        }
    }
}

/* How many bytes a bounded buffer spans */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum BufferLength {
    /* Explicit length parameter; `by_reference` when the callee may update it */
    Param { index: usize, by_reference: bool },
    /* One element of the pointee type */
    Element,
    /* C string, length found by scanning for the terminator */
    NulTerminated,
}

/// A parameter as the lowering step sees it: resolved name, declared type
/// and the direction inferred from its qualifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSlot {
    pub index: usize,
    pub name: String,
    pub ty: QualType,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "role")]
pub enum ParamRole {
    Marshalled {
        primitive: Marshalling,
        length: Option<BufferLength>,
    },
    /* By-value length folded into the bounded buffer at parameter `buffer` */
    Length { buffer: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredParam {
    pub slot: ParameterSlot,
    pub role: ParamRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoweredReturn {
    Void,
    Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredSignature {
    pub params: Vec<LoweredParam>,
    pub ret: LoweredReturn,
}

impl LoweredSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /* The primitive carrying parameter `index`, resolving folded lengths to their buffer */
    pub fn primitive_of(&self, index: usize) -> Option<Marshalling> {
        match &self.params.get(index)?.role {
            ParamRole::Marshalled { primitive, .. } => Some(*primitive),
            ParamRole::Length { buffer } => self.primitive_of(*buffer),
        }
    }
}

pub struct LoweringContext<'a> {
    pub graph: &'a DeclGraph,
    pub filter: &'a DeclFilter,
}

impl LoweringContext<'_> {
    fn shape(&self, function: &str, position: ParamPosition, ty: &QualType) -> Result<TypeShape, GenError> {
        self.graph
            .shape(ty)
            .ok_or_else(|| GenError::unmappable(function, position, format!("type '{}' is never declared", ty.name)))
    }

    fn is_opaque(&self, shape: &TypeShape) -> bool {
        match shape.category {
            Category::Std { scalar } => !scalar,
            Category::Record => {
                self.filter.classify(self.graph.node(shape.target)) == Classification::EmitOpaque
            }
            _ => false,
        }
    }

    fn is_plain_char(&self, shape: &TypeShape) -> bool {
        shape.category == Category::Scalar(ScalarKind::Byte) && self.graph.node(shape.target).name == "char"
    }
}

/// The pluggable lowering step. Implementations differ in how they treat
/// raw byte buffers; the single-parameter rules are shared.
pub trait Lowering {
    fn name(&self) -> &'static str;

    fn lower(
        &self,
        ctx: &LoweringContext<'_>,
        function: &str,
        slots: Vec<ParameterSlot>,
        return_type: &QualType,
    ) -> Result<LoweredSignature, GenError>;
}

pub fn lowering_for(kind: LoweringKind) -> Box<dyn Lowering> {
    match kind {
        LoweringKind::PairedBuffers => Box::new(PairedBufferLowering),
        LoweringKind::Independent => Box::new(IndependentLowering),
    }
}

/* Direction from qualifiers, refined by an explicit hint where that is sound */
pub fn infer_direction(
    shape: &TypeShape,
    hint: Option<DirectionHint>,
    function: &str,
    index: usize,
) -> Result<Direction, GenError> {
    let position = ParamPosition::Param(index);
    if !shape.is_indirect() {
        return match hint {
            None | Some(DirectionHint::In) => Ok(Direction::In),
            Some(_) => Err(GenError::unmappable(function, position, "a by-value parameter cannot be written back")),
        };
    }
    if shape.is_const {
        return match hint {
            None | Some(DirectionHint::In) => Ok(Direction::In),
            Some(_) => Err(GenError::unmappable(function, position, "a const pointee cannot be an output")),
        };
    }
    Ok(match hint {
        None | Some(DirectionHint::InOut) => Direction::InOut,
        Some(DirectionHint::Out) => Direction::Out,
        Some(DirectionHint::In) => Direction::In,
    })
}

fn marshalled(primitive: Marshalling, length: Option<BufferLength>) -> ParamRole {
    ParamRole::Marshalled { primitive, length }
}

/* Rules for a parameter that is not part of a buffer/length pair */
fn lower_single(ctx: &LoweringContext<'_>, function: &str, slot: &ParameterSlot) -> Result<ParamRole, GenError> {
    let position = ParamPosition::Param(slot.index);
    let shape = ctx.shape(function, position, &slot.ty)?;
    let fail = |reason: &str| Err(GenError::unmappable(function, position, reason));

    match shape.category {
        Category::Unresolved => return fail("type cannot be resolved"),
        Category::FunctionProto => return fail("function pointers cannot cross the boundary"),
        _ => {}
    }

    match shape.depth() {
        0 => match shape.category {
            Category::Scalar(ScalarKind::Void) => fail("parameter of type void"),
            Category::Scalar(_) | Category::Enum | Category::Std { scalar: true } => {
                Ok(marshalled(Marshalling::ScalarByValue, None))
            }
            _ => fail("records cannot be passed by value"),
        },
        1 => {
            if ctx.is_opaque(&shape) {
                /* the pointer itself is the handle */
                return Ok(marshalled(Marshalling::ScalarByValue, None));
            }
            match shape.category {
                Category::Scalar(ScalarKind::Void) => fail("untyped pointer without a length"),
                Category::Scalar(ScalarKind::Byte) if ctx.is_plain_char(&shape) && slot.direction == Direction::In => {
                    Ok(marshalled(Marshalling::BufferIn, Some(BufferLength::NulTerminated)))
                }
                Category::Scalar(ScalarKind::Byte) => fail("byte pointer without a length"),
                Category::Scalar(_) | Category::Enum | Category::Std { scalar: true } => match slot.direction {
                    Direction::In => Ok(marshalled(Marshalling::BufferIn, Some(BufferLength::Element))),
                    Direction::Out | Direction::InOut => Ok(marshalled(Marshalling::ScalarByReference, None)),
                },
                Category::Record | Category::Union => Ok(marshalled(
                    Marshalling::buffer(slot.direction),
                    Some(BufferLength::Element),
                )),
                _ => fail("pointee cannot be copied"),
            }
        }
        2 if ctx.is_opaque(&shape) && !shape.reference => {
            /* out-parameter receiving a handle */
            Ok(marshalled(Marshalling::ScalarByReference, None))
        }
        depth => Err(GenError::unmappable(
            function,
            position,
            format!("{} levels of indirection to a non-opaque type", depth),
        )),
    }
}

fn lower_return(ctx: &LoweringContext<'_>, function: &str, return_type: &QualType) -> Result<LoweredReturn, GenError> {
    let position = ParamPosition::Return;
    let shape = ctx.shape(function, position, return_type)?;
    match shape.category {
        Category::Unresolved => return Err(GenError::unmappable(function, position, "type cannot be resolved")),
        Category::FunctionProto => {
            return Err(GenError::unmappable(function, position, "function pointers cannot cross the boundary"));
        }
        _ => {}
    }
    if shape.reference {
        return Err(GenError::unmappable(function, position, "references cannot be returned across the boundary"));
    }
    if shape.pointers > 0 {
        return Ok(LoweredReturn::Value);
    }
    match shape.category {
        Category::Scalar(ScalarKind::Void) => Ok(LoweredReturn::Void),
        Category::Scalar(_) | Category::Enum | Category::Std { scalar: true } => Ok(LoweredReturn::Value),
        _ => Err(GenError::unmappable(function, position, "records cannot be returned by value")),
    }
}

/* `len`, `dataSize`, `byte_count` and similar spellings */
fn names_a_length(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.split('_')
        .any(|word| matches!(word, "len" | "length" | "size" | "count" | "nbytes"))
        || name.ends_with("len")
        || name.ends_with("length")
        || name.ends_with("size")
}

/// Folds `(byte pointer, length)` into one bounded buffer. The second
/// parameter only counts as a length when its type is an unsigned count
/// such as `size_t`, or when its name says it is one.
pub struct PairedBufferLowering;

impl PairedBufferLowering {
    /* Some(by_reference) when `data` followed by `length` forms a buffer pair */
    fn pair(ctx: &LoweringContext<'_>, data: &ParameterSlot, length: &ParameterSlot) -> Option<bool> {
        let data_shape = ctx.graph.shape(&data.ty)?;
        let length_shape = ctx.graph.shape(&length.ty)?;

        let byte_like = match data_shape.category {
            Category::Scalar(kind) => kind.is_byte_like(),
            Category::Std { scalar: true } => ctx.graph.node(data_shape.target).name == "std::byte",
            _ => false,
        };
        if !byte_like || data_shape.pointers != 1 || data_shape.reference {
            return None;
        }
        if length_shape.category != Category::Scalar(ScalarKind::Integral) || length_shape.reference {
            return None;
        }
        if !is_length_type(&ctx.graph.node(length_shape.target).name) && !names_a_length(&length.name) {
            return None;
        }
        match length_shape.pointers {
            0 => Some(false),
            /* a size read back only makes sense for a buffer the callee writes */
            1 if !length_shape.is_const && !data_shape.is_const => Some(true),
            _ => None,
        }
    }
}

impl Lowering for PairedBufferLowering {
    fn name(&self) -> &'static str {
        "paired-buffers"
    }

    fn lower(
        &self,
        ctx: &LoweringContext<'_>,
        function: &str,
        slots: Vec<ParameterSlot>,
        return_type: &QualType,
    ) -> Result<LoweredSignature, GenError> {
        let mut roles: Vec<Option<ParamRole>> = vec![None; slots.len()];

        let mut index = 0;
        while index < slots.len() {
            let by_reference = slots
                .get(index + 1)
                .and_then(|length| Self::pair(ctx, &slots[index], length));
            match by_reference {
                Some(by_reference) => {
                    let primitive = Marshalling::buffer(slots[index].direction);
                    roles[index] = Some(marshalled(
                        primitive,
                        Some(BufferLength::Param {
                            index: index + 1,
                            by_reference,
                        }),
                    ));
                    roles[index + 1] = Some(if by_reference {
                        marshalled(Marshalling::ScalarByReference, None)
                    } else {
                        ParamRole::Length { buffer: index }
                    });
                    index += 2;
                }
                None => {
                    roles[index] = Some(lower_single(ctx, function, &slots[index])?);
                    index += 1;
                }
            }
        }

        let ret = lower_return(ctx, function, return_type)?;
        let params = slots
            .into_iter()
            .zip(roles)
            .map(|(slot, role)| LoweredParam {
                role: role.unwrap_or(marshalled(Marshalling::ScalarByValue, None)),
                slot,
            })
            .collect();
        Ok(LoweredSignature { params, ret })
    }
}

/// Lowers each parameter on its own; byte pointers travel as remote
/// pointer values and lengths as plain scalars.
pub struct IndependentLowering;

impl Lowering for IndependentLowering {
    fn name(&self) -> &'static str {
        "independent"
    }

    fn lower(
        &self,
        ctx: &LoweringContext<'_>,
        function: &str,
        slots: Vec<ParameterSlot>,
        return_type: &QualType,
    ) -> Result<LoweredSignature, GenError> {
        let mut params = Vec::with_capacity(slots.len());
        for slot in slots {
            let remote_bytes = ctx.graph.shape(&slot.ty).is_some_and(|shape| {
                matches!(shape.category, Category::Scalar(kind) if kind.is_byte_like())
                    && shape.pointers == 1
                    && !shape.reference
                    && !(ctx.is_plain_char(&shape) && slot.direction == Direction::In)
            });
            let role = if remote_bytes {
                marshalled(Marshalling::ScalarByValue, None)
            } else {
                lower_single(ctx, function, &slot)?
            };
            params.push(LoweredParam { slot, role });
        }
        let ret = lower_return(ctx, function, return_type)?;
        Ok(LoweredSignature { params, ret })
    }
}
