//! The bit-packed level binary format (`.dat`): a version header followed
//! by a flat list of [`Element`]s, each gated by a [`GenericFlags`] bitfield
//! plus a payload-specific flags byte/word of its own.

pub mod codec;

/// A 2D point, stored as two `f32`s.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// A value that is either a literal `f32` or a named variable, distinguished
/// by an inverted marker byte on the wire (see [`codec`] for the exact bug
/// this preserves).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum VariableFloat {
    Static(f32),
    Variable(String),
}

impl Default for VariableFloat {
    fn default() -> Self {
        VariableFloat::Static(0.0)
    }
}

/// Per-peg metadata: type byte, named flag bits, and a few opaque fields
/// kept for round-trip fidelity.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PegInfo {
    pub kind: u8,
    pub variable: bool,
    pub crumble: bool,
    pub unk0: Option<i32>,
    pub unk1: Option<i32>,
    pub unk2: Option<u8>,
    pub unk3: Option<u8>,
}

/// A link to a sub-movement: `id == 1` carries a nested [`MovementInfo`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MovementLink {
    pub id: i32,
    pub inner: Option<Box<MovementInfo>>,
}

/// Describes how an element moves: a motion shape plus whatever optional
/// parameters that shape's 16-bit flag word selects.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MovementInfo {
    pub shape: i8,
    pub anchor: Point,
    pub time_period: i16,
    pub offset: Option<i16>,
    pub radius1: Option<i16>,
    pub start_phase: Option<f32>,
    pub rotation_speed: Option<f32>,
    pub radius2: Option<i16>,
    pub pause1: Option<i16>,
    pub pause2: Option<i16>,
    pub phase1: Option<u8>,
    pub phase2: Option<u8>,
    pub post_delay_phase: Option<f32>,
    pub max_angle: Option<f32>,
    pub unk8: Option<f32>,
    /// Read/written after `unk8` and before `sub_movement`/`object`, despite
    /// the name suggesting it belongs near `rotation_speed` — this mirrors
    /// the original field order exactly.
    pub rotation: Option<f32>,
    pub sub_movement: Option<(f32, f32, MovementLink)>,
    pub object: Option<(f32, f32)>,
}

/// The element-wide optional data block, gated by [`GenericFlags`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GenericData {
    pub rolly: Option<f32>,
    pub bouncy: Option<f32>,
    pub peg_info: Option<PegInfo>,
    pub movement: Option<MovementLink>,
    pub unk0: Option<i32>,
    pub solid_color: Option<u32>,
    pub outline_color: Option<u32>,
    pub image: Option<String>,
    pub image_dx: Option<f32>,
    pub image_dy: Option<f32>,
    pub rotation: Option<f32>,
    pub unk1: Option<i32>,
    pub id: Option<String>,
    pub unk2: Option<i32>,
    pub sound: Option<u8>,
    pub logic: Option<String>,
    pub max_bounce_velocity: Option<f32>,
    pub sub_id: Option<f32>,
    pub flipper_flags: Option<u8>,
}

/// Named bits of [`GenericData`]'s gating flags. Bits with no payload of
/// their own are still preserved verbatim (they drive visibility/collision
/// behavior elsewhere in the engine, not decoded data here).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GenericFlags(pub u32);

macro_rules! flag_bit {
    ($get:ident, $set:ident, $bit:expr) => {
        pub fn $get(self) -> bool {
            self.0 & (1 << $bit) != 0
        }
        pub fn $set(&mut self, v: bool) {
            if v {
                self.0 |= 1 << $bit;
            } else {
                self.0 &= !(1 << $bit);
            }
        }
    };
}

impl GenericFlags {
    flag_bit!(is_rolly, set_rolly, 0);
    flag_bit!(is_bouncy, set_bouncy, 1);
    flag_bit!(has_peg_info, set_has_peg_info, 2);
    flag_bit!(has_movement, set_has_movement, 3);
    flag_bit!(has_unk0, set_has_unk0, 4);
    flag_bit!(has_collision, set_has_collision, 5);
    flag_bit!(is_visible, set_is_visible, 6);
    flag_bit!(can_move, set_can_move, 7);
    flag_bit!(has_solid_color, set_has_solid_color, 8);
    flag_bit!(has_outline_color, set_has_outline_color, 9);
    flag_bit!(has_image, set_has_image, 10);
    flag_bit!(has_image_dx, set_has_image_dx, 11);
    flag_bit!(has_image_dy, set_has_image_dy, 12);
    flag_bit!(has_rotation, set_has_rotation, 13);
    flag_bit!(has_background, set_has_background, 14);
    flag_bit!(has_base_object, set_has_base_object, 15);
    flag_bit!(has_unk1, set_has_unk1, 16);
    flag_bit!(has_id, set_has_id, 17);
    flag_bit!(has_unk2, set_has_unk2, 18);
    flag_bit!(has_sound, set_has_sound, 19);
    flag_bit!(has_ball_stop_reset, set_has_ball_stop_reset, 20);
    flag_bit!(has_logic, set_has_logic, 21);
    flag_bit!(has_foreground, set_has_foreground, 22);
    flag_bit!(has_max_bounce_velocity, set_has_max_bounce_velocity, 23);
    flag_bit!(has_draw_sort, set_has_draw_sort, 24);
    flag_bit!(has_foreground2, set_has_foreground2, 25);
    flag_bit!(has_sub_id, set_has_sub_id, 26);
    flag_bit!(has_flipper_flags, set_has_flipper_flags, 27);
    flag_bit!(has_draw_float, set_has_draw_float, 28);
    flag_bit!(has_unk3, set_has_unk3, 29);
    flag_bit!(has_shadow, set_has_shadow, 30);
}

/// A rod: two anchor points plus two optional trailing floats.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RodEntry {
    pub flags: u8,
    pub a: Point,
    pub b: Point,
    pub e: Option<f32>,
    pub f: Option<f32>,
}

/// A closed polygon outline.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PolygonEntry {
    pub flags_a: u8,
    pub flags_b: Option<u8>,
    pub rotation: Option<f32>,
    pub unk1: Option<f32>,
    pub scale: Option<f32>,
    pub normal_dir: Option<u8>,
    pub pos: Option<Point>,
    pub points: Vec<Point>,
    pub unk2: Option<u8>,
    pub grow_type: Option<i32>,
}

/// A circular peg or obstacle.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CircleEntry {
    pub flags_a: u8,
    pub flags_b: Option<u8>,
    pub pos: Option<Point>,
    pub radius: f32,
}

/// A brick: the largest fixed-shape entry, with three stacked flag fields.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BrickEntry {
    pub flags_a: u8,
    pub flags_b: Option<u8>,
    pub flags_c: u16,
    pub unk1: Option<f32>,
    pub unk2: Option<f32>,
    pub unk3: Option<f32>,
    pub unk4: Option<u8>,
    pub pos: Option<Point>,
    pub unk5: Option<u8>,
    pub unk6: Option<i32>,
    pub unk7: Option<i16>,
    pub unk8: Option<f32>,
    pub unk9: Option<f32>,
    pub kind: Option<u8>,
    pub curved: bool,
    pub curved_points: Option<u8>,
    pub left_angle: Option<f32>,
    pub right_angle: Option<f32>,
    pub unk10: Option<f32>,
    pub sector_angle: Option<f32>,
    pub width: Option<f32>,
    pub texture_flip: bool,
    pub length: f32,
    pub angle: f32,
    pub unk12: u32,
}

/// A teleporter: dimensions plus a recursive destination [`Element`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TeleportEntry {
    pub flags: u8,
    pub width: i32,
    pub height: i32,
    pub unk0: Option<i16>,
    pub unk1: Option<i32>,
    pub unk2: Option<i32>,
    pub entry: Option<Box<Element>>,
    pub pos: Option<Point>,
    pub unk3: Option<f32>,
    pub unk4: Option<f32>,
}

/// A particle emitter. `main_var == 2` unlocks a second, rarer parameter
/// block; most of the rest is gated by a 16-bit flag word. Fields named
/// `hasUnk0`/`hasUnk1`/`hasTransparancy`/`hasUnk2`/`hasRandomStartPosition`
/// in the original flag bitfield have no corresponding data in the known
/// wire format and are preserved only as raw bits of `flags`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmitterEntry {
    pub main_var: i32,
    pub flags: u16,
    pub image: String,
    pub width: i32,
    pub height: i32,
    pub main_var0: Option<i32>,
    pub main_var1: Option<f32>,
    pub main_var2: Option<String>,
    pub main_var3: Option<u8>,
    pub unknown0: Option<VariableFloat>,
    pub unknown1: Option<VariableFloat>,
    pub pos: Option<Point>,
    pub emit_image: String,
    pub unknown_emit_rate: f32,
    pub unknown2: f32,
    pub rotation: f32,
    pub max_quantity: i32,
    pub time_before_fade_out: f32,
    pub fade_in_time: f32,
    pub life_duration: f32,
    pub emit_rate: VariableFloat,
    pub emit_area_multiplier: VariableFloat,
    pub initial_rotation: Option<VariableFloat>,
    pub rotation_velocity: Option<VariableFloat>,
    pub rotation_unknown: Option<f32>,
    pub min_scale: Option<VariableFloat>,
    pub scale_velocity: Option<VariableFloat>,
    pub max_rand_scale: Option<f32>,
    pub colour_red: Option<VariableFloat>,
    pub colour_green: Option<VariableFloat>,
    pub colour_blue: Option<VariableFloat>,
    pub opacity: Option<VariableFloat>,
    pub min_velocity_x: Option<VariableFloat>,
    pub min_velocity_y: Option<VariableFloat>,
    pub max_velocity_x: Option<f32>,
    pub max_velocity_y: Option<f32>,
    pub acceleration_x: Option<f32>,
    pub acceleration_y: Option<f32>,
    pub direction_speed: Option<f32>,
    pub direction_random_speed: Option<f32>,
    pub direction_acceleration: Option<f32>,
    pub direction_angle: Option<f32>,
    pub direction_random_angle: Option<f32>,
    pub unknown_a: Option<f32>,
    pub unknown_b: Option<f32>,
}

/// The six concrete payload shapes an [`Element`] can carry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Payload {
    Rod(RodEntry),
    Polygon(PolygonEntry),
    Circle(CircleEntry),
    Brick(BrickEntry),
    Teleport(TeleportEntry),
    Emitter(EmitterEntry),
}

impl Payload {
    /// The on-wire discriminant for this payload's shape.
    pub fn kind(&self) -> i32 {
        match self {
            Payload::Rod(_) => 2,
            Payload::Polygon(_) => 3,
            Payload::Circle(_) => 5,
            Payload::Brick(_) => 6,
            Payload::Teleport(_) => 8,
            Payload::Emitter(_) => 9,
        }
    }
}

/// One level object: a magic/sanity word, the generic optional-data block,
/// and a type-specific payload.
///
/// `magic` is always `1` for a real element. A value other than `1` is a
/// terminator the original format tolerates mid-stream: nothing past the
/// magic word is read or written for it, and `eType`/`flags`/`generic` are
/// meaningless. [`codec`] preserves that behavior exactly for round-trip
/// fidelity with files that contain one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Element {
    pub magic: i32,
    pub flags: GenericFlags,
    pub generic: GenericData,
    pub payload: Payload,
}

/// A full level: format version, a sync byte, and the element list. Any
/// bytes following the last element (alignment padding in some files) are
/// preserved verbatim in `trailer` so encoding reproduces the input exactly.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Level {
    pub version: u32,
    pub sync: u8,
    pub elements: Vec<Element>,
    pub trailer: Vec<u8>,
}
