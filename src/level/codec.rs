//! Recursive decode/encode for [`Level`] and everything it contains.
//!
//! Transcribed field-for-field and bit-for-bit from the original
//! `pegglelevel.cpp` (`read_element`/`write_element` and friends), down to
//! the quirks: the 3-byte `GenericFlags` special case for `version == 4`,
//! and the inverted marker byte in [`VariableFloat`].

use crate::bitstream::BitStream;
use crate::error::{Error, Result};

use super::*;

fn read_string(bs: &mut BitStream) -> Result<String> {
    let len = bs.read_i16()?;
    if len <= 0 {
        return Ok(String::new());
    }
    let bytes = bs.read_bytes(len as usize)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_string(bs: &mut BitStream, s: &str) {
    bs.write_i16(s.len() as i16);
    if !s.is_empty() {
        bs.write_bytes(s.as_bytes());
    }
}

fn read_variable_float(bs: &mut BitStream) -> Result<VariableFloat> {
    let marker = bs.read_i8()?;
    if marker > 0 {
        Ok(VariableFloat::Static(bs.read_f32()?))
    } else {
        Ok(VariableFloat::Variable(read_string(bs)?))
    }
}

fn write_variable_float(bs: &mut BitStream, vf: &VariableFloat) {
    match vf {
        VariableFloat::Static(v) => {
            bs.write_i8(1);
            bs.write_f32(*v);
        }
        VariableFloat::Variable(s) => {
            bs.write_i8(0);
            write_string(bs, s);
        }
    }
}

fn read_point(bs: &mut BitStream) -> Result<Point> {
    Ok(Point { x: bs.read_f32()?, y: bs.read_f32()? })
}

fn write_point(bs: &mut BitStream, p: Point) {
    bs.write_f32(p.x);
    bs.write_f32(p.y);
}

// ---------------------------------------------------------------------
// Payload entries
// ---------------------------------------------------------------------

fn read_rod(bs: &mut BitStream) -> Result<RodEntry> {
    let flags = bs.read_u8()?;
    let a = read_point(bs)?;
    let b = read_point(bs)?;
    let e = if flags & (1 << 0) != 0 { Some(bs.read_f32()?) } else { None };
    let f = if flags & (1 << 1) != 0 { Some(bs.read_f32()?) } else { None };
    Ok(RodEntry { flags, a, b, e, f })
}

fn write_rod(bs: &mut BitStream, r: &RodEntry) {
    bs.write_u8(r.flags);
    write_point(bs, r.a);
    write_point(bs, r.b);
    if let Some(v) = r.e {
        bs.write_f32(v);
    }
    if let Some(v) = r.f {
        bs.write_f32(v);
    }
}

fn read_polygon(bs: &mut BitStream, version: u32) -> Result<PolygonEntry> {
    let flags_a = bs.read_u8()?;
    let flags_b = if version > 0x23 { Some(bs.read_u8()?) } else { None };

    let rotation = if flags_a & (1 << 2) != 0 { Some(bs.read_f32()?) } else { None };
    let unk1 = if flags_a & (1 << 3) != 0 { Some(bs.read_f32()?) } else { None };
    let scale = if flags_a & (1 << 5) != 0 { Some(bs.read_f32()?) } else { None };
    let normal_dir = if flags_a & (1 << 1) != 0 { Some(bs.read_u8()?) } else { None };
    let pos = if flags_a & (1 << 4) != 0 { Some(read_point(bs)?) } else { None };

    let num_points = bs.read_i32()?.max(0);
    let mut points = Vec::with_capacity(num_points as usize);
    for _ in 0..num_points {
        points.push(read_point(bs)?);
    }

    let fb = flags_b.unwrap_or(0);
    let unk2 = if flags_b.is_some() && fb & (1 << 0) != 0 { Some(bs.read_u8()?) } else { None };
    let grow_type = if flags_b.is_some() && fb & (1 << 1) != 0 { Some(bs.read_i32()?) } else { None };

    Ok(PolygonEntry { flags_a, flags_b, rotation, unk1, scale, normal_dir, pos, points, unk2, grow_type })
}

fn write_polygon(bs: &mut BitStream, version: u32, p: &PolygonEntry) {
    bs.write_u8(p.flags_a);
    if version > 0x23 {
        bs.write_u8(p.flags_b.unwrap_or(0));
    }
    if let Some(v) = p.rotation {
        bs.write_f32(v);
    }
    if let Some(v) = p.unk1 {
        bs.write_f32(v);
    }
    if let Some(v) = p.scale {
        bs.write_f32(v);
    }
    if let Some(v) = p.normal_dir {
        bs.write_u8(v);
    }
    if let Some(v) = p.pos {
        write_point(bs, v);
    }
    bs.write_i32(p.points.len() as i32);
    for pt in &p.points {
        write_point(bs, *pt);
    }
    if let Some(v) = p.unk2 {
        bs.write_u8(v);
    }
    if let Some(v) = p.grow_type {
        bs.write_i32(v);
    }
}

fn read_circle(bs: &mut BitStream, version: u32) -> Result<CircleEntry> {
    let flags_a = bs.read_u8()?;
    let flags_b = if version >= 0x52 { Some(bs.read_u8()?) } else { None };
    let pos = if flags_a & (1 << 1) != 0 { Some(read_point(bs)?) } else { None };
    let radius = bs.read_f32()?;
    Ok(CircleEntry { flags_a, flags_b, pos, radius })
}

fn write_circle(bs: &mut BitStream, version: u32, c: &CircleEntry) {
    bs.write_u8(c.flags_a);
    if version >= 0x52 {
        bs.write_u8(c.flags_b.unwrap_or(0));
    }
    if let Some(v) = c.pos {
        write_point(bs, v);
    }
    bs.write_f32(c.radius);
}

fn read_brick(bs: &mut BitStream, version: u32) -> Result<BrickEntry> {
    let flags_a = bs.read_u8()?;
    let flags_b = if version >= 0x23 { Some(bs.read_u8()?) } else { None };

    let unk1 = if flags_a & (1 << 2) != 0 { Some(bs.read_f32()?) } else { None };
    let unk2 = if flags_a & (1 << 3) != 0 { Some(bs.read_f32()?) } else { None };
    let unk3 = if flags_a & (1 << 5) != 0 { Some(bs.read_f32()?) } else { None };
    let unk4 = if flags_a & (1 << 1) != 0 { Some(bs.read_u8()?) } else { None };
    let pos = if flags_a & (1 << 4) != 0 { Some(read_point(bs)?) } else { None };

    let fb = flags_b.unwrap_or(0);
    let unk5 = if flags_b.is_some() && fb & (1 << 0) != 0 { Some(bs.read_u8()?) } else { None };
    let unk6 = if flags_b.is_some() && fb & (1 << 1) != 0 { Some(bs.read_i32()?) } else { None };
    let unk7 = if flags_b.is_some() && fb & (1 << 2) != 0 { Some(bs.read_i16()?) } else { None };

    let flags_c = bs.read_u16()?;

    let unk8 = if flags_c & (1 << 8) != 0 { Some(bs.read_f32()?) } else { None };
    let unk9 = if flags_c & (1 << 9) != 0 { Some(bs.read_f32()?) } else { None };
    let mut curved = true;
    let kind = if flags_c & (1 << 2) != 0 {
        let t = bs.read_u8()?;
        if t == 5 {
            curved = false;
        }
        Some(t)
    } else {
        None
    };
    let curved_points = if flags_c & (1 << 3) != 0 { Some(bs.read_u8()? + 2) } else { None };
    let left_angle = if flags_c & (1 << 5) != 0 { Some(bs.read_f32()?) } else { None };
    let (right_angle, unk10) = if flags_c & (1 << 6) != 0 {
        (Some(bs.read_f32()?), Some(bs.read_f32()?))
    } else {
        (None, None)
    };
    let sector_angle = if flags_c & (1 << 4) != 0 { Some(bs.read_f32()?) } else { None };
    let width = if flags_c & (1 << 7) != 0 { Some(bs.read_f32()?) } else { None };
    let texture_flip = flags_c & (1 << 10) != 0;

    let length = bs.read_f32()?;
    let angle = bs.read_f32()?;
    let unk12 = bs.read_u32()?;

    Ok(BrickEntry {
        flags_a,
        flags_b,
        flags_c,
        unk1,
        unk2,
        unk3,
        unk4,
        pos,
        unk5,
        unk6,
        unk7,
        unk8,
        unk9,
        kind,
        curved,
        curved_points,
        left_angle,
        right_angle,
        unk10,
        sector_angle,
        width,
        texture_flip,
        length,
        angle,
        unk12,
    })
}

fn write_brick(bs: &mut BitStream, version: u32, b: &BrickEntry) {
    bs.write_u8(b.flags_a);
    if version >= 0x23 {
        bs.write_u8(b.flags_b.unwrap_or(0));
    }
    if let Some(v) = b.unk1 {
        bs.write_f32(v);
    }
    if let Some(v) = b.unk2 {
        bs.write_f32(v);
    }
    if let Some(v) = b.unk3 {
        bs.write_f32(v);
    }
    if let Some(v) = b.unk4 {
        bs.write_u8(v);
    }
    if let Some(v) = b.pos {
        write_point(bs, v);
    }
    if let Some(v) = b.unk5 {
        bs.write_u8(v);
    }
    if let Some(v) = b.unk6 {
        bs.write_i32(v);
    }
    if let Some(v) = b.unk7 {
        bs.write_i16(v);
    }
    bs.write_u16(b.flags_c);
    if let Some(v) = b.unk8 {
        bs.write_f32(v);
    }
    if let Some(v) = b.unk9 {
        bs.write_f32(v);
    }
    if let Some(v) = b.kind {
        bs.write_u8(v);
    }
    if let Some(v) = b.curved_points {
        bs.write_u8(v - 2);
    }
    if let Some(v) = b.left_angle {
        bs.write_f32(v);
    }
    if let Some(v) = b.right_angle {
        bs.write_f32(v);
        bs.write_f32(b.unk10.unwrap_or(0.0));
    }
    if let Some(v) = b.sector_angle {
        bs.write_f32(v);
    }
    if let Some(v) = b.width {
        bs.write_f32(v);
    }
    bs.write_f32(b.length);
    bs.write_f32(b.angle);
    bs.write_u32(b.unk12);
}

fn read_teleport(bs: &mut BitStream, version: u32) -> Result<TeleportEntry> {
    let flags = bs.read_u8()?;
    let width = bs.read_i32()?;
    let height = bs.read_i32()?;

    let unk0 = if flags & (1 << 1) != 0 { Some(bs.read_i16()?) } else { None };
    let unk1 = if flags & (1 << 3) != 0 { Some(bs.read_i32()?) } else { None };
    let unk2 = if flags & (1 << 5) != 0 { Some(bs.read_i32()?) } else { None };
    let entry = if flags & (1 << 4) != 0 { Some(Box::new(read_element(bs, version)?)) } else { None };
    let pos = if flags & (1 << 2) != 0 { Some(read_point(bs)?) } else { None };
    let (unk3, unk4) = if flags & (1 << 6) != 0 { (Some(bs.read_f32()?), Some(bs.read_f32()?)) } else { (None, None) };

    Ok(TeleportEntry { flags, width, height, unk0, unk1, unk2, entry, pos, unk3, unk4 })
}

fn write_teleport(bs: &mut BitStream, version: u32, t: &TeleportEntry) -> Result<()> {
    bs.write_u8(t.flags);
    bs.write_i32(t.width);
    bs.write_i32(t.height);
    if let Some(v) = t.unk0 {
        bs.write_i16(v);
    }
    if let Some(v) = t.unk1 {
        bs.write_i32(v);
    }
    if let Some(v) = t.unk2 {
        bs.write_i32(v);
    }
    if let Some(inner) = &t.entry {
        write_element(bs, version, inner)?;
    }
    if let Some(v) = t.pos {
        write_point(bs, v);
    }
    if let (Some(a), Some(b)) = (t.unk3, t.unk4) {
        bs.write_f32(a);
        bs.write_f32(b);
    }
    Ok(())
}

fn read_emitter(bs: &mut BitStream) -> Result<EmitterEntry> {
    let main_var = bs.read_i32()?;
    let flags = bs.read_u16()?;
    let image = read_string(bs)?;
    let width = bs.read_i32()?;
    let height = bs.read_i32()?;

    let mut e = EmitterEntry { main_var, flags, image, width, height, ..Default::default() };

    if main_var == 2 {
        e.main_var0 = Some(bs.read_i32()?);
        e.main_var1 = Some(bs.read_f32()?);
        e.main_var2 = Some(read_string(bs)?);
        e.main_var3 = Some(bs.read_u8()?);
        if flags & (1 << 13) != 0 {
            e.unknown0 = Some(read_variable_float(bs)?);
            e.unknown1 = Some(read_variable_float(bs)?);
        }
    }

    if flags & (1 << 5) != 0 {
        e.pos = Some(read_point(bs)?);
    }

    e.emit_image = read_string(bs)?;
    e.unknown_emit_rate = bs.read_f32()?;
    e.unknown2 = bs.read_f32()?;
    e.rotation = bs.read_f32()?;
    e.max_quantity = bs.read_i32()?;

    e.time_before_fade_out = bs.read_f32()?;
    e.fade_in_time = bs.read_f32()?;
    e.life_duration = bs.read_f32()?;

    e.emit_rate = read_variable_float(bs)?;
    e.emit_area_multiplier = read_variable_float(bs)?;

    if flags & (1 << 12) != 0 {
        e.initial_rotation = Some(read_variable_float(bs)?);
        e.rotation_velocity = Some(read_variable_float(bs)?);
        e.rotation_unknown = Some(bs.read_f32()?);
    }
    if flags & (1 << 7) != 0 {
        e.min_scale = Some(read_variable_float(bs)?);
        e.scale_velocity = Some(read_variable_float(bs)?);
        e.max_rand_scale = Some(bs.read_f32()?);
    }
    if flags & (1 << 8) != 0 {
        e.colour_red = Some(read_variable_float(bs)?);
        e.colour_green = Some(read_variable_float(bs)?);
        e.colour_blue = Some(read_variable_float(bs)?);
    }
    if flags & (1 << 9) != 0 {
        e.opacity = Some(read_variable_float(bs)?);
    }
    if flags & (1 << 10) != 0 {
        e.min_velocity_x = Some(read_variable_float(bs)?);
        e.min_velocity_y = Some(read_variable_float(bs)?);
        e.max_velocity_x = Some(bs.read_f32()?);
        e.max_velocity_y = Some(bs.read_f32()?);
        e.acceleration_x = Some(bs.read_f32()?);
        e.acceleration_y = Some(bs.read_f32()?);
    }
    if flags & (1 << 11) != 0 {
        e.direction_speed = Some(bs.read_f32()?);
        e.direction_random_speed = Some(bs.read_f32()?);
        e.direction_acceleration = Some(bs.read_f32()?);
        e.direction_angle = Some(bs.read_f32()?);
        e.direction_random_angle = Some(bs.read_f32()?);
    }
    if flags & (1 << 6) != 0 {
        e.unknown_a = Some(bs.read_f32()?);
        e.unknown_b = Some(bs.read_f32()?);
    }

    Ok(e)
}

fn write_emitter(bs: &mut BitStream, e: &EmitterEntry) {
    bs.write_i32(e.main_var);
    bs.write_u16(e.flags);
    write_string(bs, &e.image);
    bs.write_i32(e.width);
    bs.write_i32(e.height);

    if e.main_var == 2 {
        bs.write_i32(e.main_var0.unwrap_or(0));
        bs.write_f32(e.main_var1.unwrap_or(0.0));
        write_string(bs, e.main_var2.as_deref().unwrap_or(""));
        bs.write_u8(e.main_var3.unwrap_or(0));
        if e.flags & (1 << 13) != 0 {
            write_variable_float(bs, e.unknown0.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
            write_variable_float(bs, e.unknown1.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        }
    }

    if e.flags & (1 << 5) != 0 {
        write_point(bs, e.pos.unwrap_or_default());
    }

    write_string(bs, &e.emit_image);
    bs.write_f32(e.unknown_emit_rate);
    bs.write_f32(e.unknown2);
    bs.write_f32(e.rotation);
    bs.write_i32(e.max_quantity);

    bs.write_f32(e.time_before_fade_out);
    bs.write_f32(e.fade_in_time);
    bs.write_f32(e.life_duration);

    write_variable_float(bs, &e.emit_rate);
    write_variable_float(bs, &e.emit_area_multiplier);

    if e.flags & (1 << 12) != 0 {
        write_variable_float(bs, e.initial_rotation.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        write_variable_float(bs, e.rotation_velocity.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        bs.write_f32(e.rotation_unknown.unwrap_or(0.0));
    }
    if e.flags & (1 << 7) != 0 {
        write_variable_float(bs, e.min_scale.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        write_variable_float(bs, e.scale_velocity.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        bs.write_f32(e.max_rand_scale.unwrap_or(0.0));
    }
    if e.flags & (1 << 8) != 0 {
        write_variable_float(bs, e.colour_red.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        write_variable_float(bs, e.colour_green.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        write_variable_float(bs, e.colour_blue.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
    }
    if e.flags & (1 << 9) != 0 {
        write_variable_float(bs, e.opacity.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
    }
    if e.flags & (1 << 10) != 0 {
        write_variable_float(bs, e.min_velocity_x.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        write_variable_float(bs, e.min_velocity_y.as_ref().unwrap_or(&VariableFloat::Static(0.0)));
        bs.write_f32(e.max_velocity_x.unwrap_or(0.0));
        bs.write_f32(e.max_velocity_y.unwrap_or(0.0));
        bs.write_f32(e.acceleration_x.unwrap_or(0.0));
        bs.write_f32(e.acceleration_y.unwrap_or(0.0));
    }
    if e.flags & (1 << 11) != 0 {
        bs.write_f32(e.direction_speed.unwrap_or(0.0));
        bs.write_f32(e.direction_random_speed.unwrap_or(0.0));
        bs.write_f32(e.direction_acceleration.unwrap_or(0.0));
        bs.write_f32(e.direction_angle.unwrap_or(0.0));
        bs.write_f32(e.direction_random_angle.unwrap_or(0.0));
    }
    if e.flags & (1 << 6) != 0 {
        bs.write_f32(e.unknown_a.unwrap_or(0.0));
        bs.write_f32(e.unknown_b.unwrap_or(0.0));
    }
}

fn read_payload(bs: &mut BitStream, kind: i32, version: u32) -> Result<Payload> {
    Ok(match kind {
        2 => Payload::Rod(read_rod(bs)?),
        3 => Payload::Polygon(read_polygon(bs, version)?),
        5 => Payload::Circle(read_circle(bs, version)?),
        6 => Payload::Brick(read_brick(bs, version)?),
        8 => Payload::Teleport(read_teleport(bs, version)?),
        9 => Payload::Emitter(read_emitter(bs)?),
        other => return Err(Error::InvalidKind(other as i64)),
    })
}

fn write_payload(bs: &mut BitStream, version: u32, payload: &Payload) -> Result<()> {
    match payload {
        Payload::Rod(r) => write_rod(bs, r),
        Payload::Polygon(p) => write_polygon(bs, version, p),
        Payload::Circle(c) => write_circle(bs, version, c),
        Payload::Brick(b) => write_brick(bs, version, b),
        Payload::Teleport(t) => write_teleport(bs, version, t)?,
        Payload::Emitter(e) => write_emitter(bs, e),
    }
    Ok(())
}

// ---------------------------------------------------------------------
// MovementInfo / MovementLink / PegInfo / GenericData
// ---------------------------------------------------------------------

fn read_movement(bs: &mut BitStream) -> Result<MovementInfo> {
    let shape = bs.read_i8()?;
    let anchor = read_point(bs)?;
    let time_period = bs.read_i16()?;
    let flags = bs.read_i16()? as u16;

    let mut m = MovementInfo { shape, anchor, time_period, ..Default::default() };
    if flags & (1 << 0) != 0 {
        m.offset = Some(bs.read_i16()?);
    }
    if flags & (1 << 1) != 0 {
        m.radius1 = Some(bs.read_i16()?);
    }
    if flags & (1 << 2) != 0 {
        m.start_phase = Some(bs.read_f32()?);
    }
    if flags & (1 << 3) != 0 {
        m.rotation_speed = Some(bs.read_f32()?);
    }
    if flags & (1 << 4) != 0 {
        m.radius2 = Some(bs.read_i16()?);
    }
    if flags & (1 << 5) != 0 {
        m.pause1 = Some(bs.read_i16()?);
    }
    if flags & (1 << 6) != 0 {
        m.pause2 = Some(bs.read_i16()?);
    }
    if flags & (1 << 7) != 0 {
        m.phase1 = Some(bs.read_u8()?);
    }
    if flags & (1 << 8) != 0 {
        m.phase2 = Some(bs.read_u8()?);
    }
    if flags & (1 << 9) != 0 {
        m.post_delay_phase = Some(bs.read_f32()?);
    }
    if flags & (1 << 10) != 0 {
        m.max_angle = Some(bs.read_f32()?);
    }
    if flags & (1 << 11) != 0 {
        m.unk8 = Some(bs.read_f32()?);
    }
    if flags & (1 << 14) != 0 {
        m.rotation = Some(bs.read_f32()?);
    }
    if flags & (1 << 12) != 0 {
        let ox = bs.read_f32()?;
        let oy = bs.read_f32()?;
        let link = read_movement_link(bs)?;
        m.sub_movement = Some((ox, oy, link));
    }
    if flags & (1 << 13) != 0 {
        let ox = bs.read_f32()?;
        let oy = bs.read_f32()?;
        m.object = Some((ox, oy));
    }
    Ok(m)
}

fn write_movement(bs: &mut BitStream, m: &MovementInfo) -> Result<()> {
    bs.write_i8(m.shape);
    write_point(bs, m.anchor);
    bs.write_i16(m.time_period);

    let mut flags: u16 = 0;
    if m.offset.is_some() {
        flags |= 1 << 0;
    }
    if m.radius1.is_some() {
        flags |= 1 << 1;
    }
    if m.start_phase.is_some() {
        flags |= 1 << 2;
    }
    if m.rotation_speed.is_some() {
        flags |= 1 << 3;
    }
    if m.radius2.is_some() {
        flags |= 1 << 4;
    }
    if m.pause1.is_some() {
        flags |= 1 << 5;
    }
    if m.pause2.is_some() {
        flags |= 1 << 6;
    }
    if m.phase1.is_some() {
        flags |= 1 << 7;
    }
    if m.phase2.is_some() {
        flags |= 1 << 8;
    }
    if m.post_delay_phase.is_some() {
        flags |= 1 << 9;
    }
    if m.max_angle.is_some() {
        flags |= 1 << 10;
    }
    if m.unk8.is_some() {
        flags |= 1 << 11;
    }
    if m.rotation.is_some() {
        flags |= 1 << 14;
    }
    if m.sub_movement.is_some() {
        flags |= 1 << 12;
    }
    if m.object.is_some() {
        flags |= 1 << 13;
    }
    bs.write_i16(flags as i16);

    if let Some(v) = m.offset {
        bs.write_i16(v);
    }
    if let Some(v) = m.radius1 {
        bs.write_i16(v);
    }
    if let Some(v) = m.start_phase {
        bs.write_f32(v);
    }
    if let Some(v) = m.rotation_speed {
        bs.write_f32(v);
    }
    if let Some(v) = m.radius2 {
        bs.write_i16(v);
    }
    if let Some(v) = m.pause1 {
        bs.write_i16(v);
    }
    if let Some(v) = m.pause2 {
        bs.write_i16(v);
    }
    if let Some(v) = m.phase1 {
        bs.write_u8(v);
    }
    if let Some(v) = m.phase2 {
        bs.write_u8(v);
    }
    if let Some(v) = m.post_delay_phase {
        bs.write_f32(v);
    }
    if let Some(v) = m.max_angle {
        bs.write_f32(v);
    }
    if let Some(v) = m.unk8 {
        bs.write_f32(v);
    }
    if let Some(v) = m.rotation {
        bs.write_f32(v);
    }
    if let Some((ox, oy, link)) = &m.sub_movement {
        bs.write_f32(*ox);
        bs.write_f32(*oy);
        write_movement_link(bs, link)?;
    }
    if let Some((ox, oy)) = m.object {
        bs.write_f32(ox);
        bs.write_f32(oy);
    }
    Ok(())
}

fn read_movement_link(bs: &mut BitStream) -> Result<MovementLink> {
    let id = bs.read_i32()?;
    let inner = if id == 1 { Some(Box::new(read_movement(bs)?)) } else { None };
    Ok(MovementLink { id, inner })
}

fn write_movement_link(bs: &mut BitStream, l: &MovementLink) -> Result<()> {
    bs.write_i32(l.id);
    if l.id == 1 {
        write_movement(bs, l.inner.as_deref().ok_or_else(|| Error::ParseError("movement link id==1 with no inner movement".into()))?)?;
    }
    Ok(())
}

fn read_peginfo(bs: &mut BitStream) -> Result<PegInfo> {
    let kind = bs.read_u8()?;
    let flags = bs.read_u8()?;
    let mut p = PegInfo { kind, ..Default::default() };
    p.variable = flags & (1 << 1) != 0;
    if flags & (1 << 2) != 0 {
        p.unk0 = Some(bs.read_i32()?);
    }
    p.crumble = flags & (1 << 3) != 0;
    if flags & (1 << 4) != 0 {
        p.unk1 = Some(bs.read_i32()?);
    }
    if flags & (1 << 5) != 0 {
        p.unk2 = Some(bs.read_u8()?);
    }
    if flags & (1 << 7) != 0 {
        p.unk3 = Some(bs.read_u8()?);
    }
    Ok(p)
}

fn write_peginfo(bs: &mut BitStream, p: &PegInfo) {
    bs.write_u8(p.kind);
    let mut flags: u8 = 0;
    if p.variable {
        flags |= 1 << 1;
    }
    if p.unk0.is_some() {
        flags |= 1 << 2;
    }
    if p.crumble {
        flags |= 1 << 3;
    }
    if p.unk1.is_some() {
        flags |= 1 << 4;
    }
    if p.unk2.is_some() {
        flags |= 1 << 5;
    }
    if p.unk3.is_some() {
        flags |= 1 << 7;
    }
    bs.write_u8(flags);
    if let Some(v) = p.unk0 {
        bs.write_i32(v);
    }
    if let Some(v) = p.unk1 {
        bs.write_i32(v);
    }
    if let Some(v) = p.unk2 {
        bs.write_u8(v);
    }
    if let Some(v) = p.unk3 {
        bs.write_u8(v);
    }
}

fn read_generic(bs: &mut BitStream, flags: GenericFlags) -> Result<GenericData> {
    let mut g = GenericData::default();
    if flags.is_rolly() {
        g.rolly = Some(bs.read_f32()?);
    }
    if flags.is_bouncy() {
        g.bouncy = Some(bs.read_f32()?);
    }
    if flags.has_unk0() {
        g.unk0 = Some(bs.read_i32()?);
    }
    if flags.has_solid_color() {
        g.solid_color = Some(bs.read_u32()?);
    }
    if flags.has_outline_color() {
        g.outline_color = Some(bs.read_u32()?);
    }
    if flags.has_image() {
        g.image = Some(read_string(bs)?);
    }
    if flags.has_image_dx() {
        g.image_dx = Some(bs.read_f32()?);
    }
    if flags.has_image_dy() {
        g.image_dy = Some(bs.read_f32()?);
    }
    if flags.has_rotation() {
        g.rotation = Some(bs.read_f32()?);
    }
    if flags.has_unk1() {
        g.unk1 = Some(bs.read_i32()?);
    }
    if flags.has_id() {
        g.id = Some(read_string(bs)?);
    }
    if flags.has_unk2() {
        g.unk2 = Some(bs.read_i32()?);
    }
    if flags.has_sound() {
        g.sound = Some(bs.read_u8()?);
    }
    if flags.has_logic() {
        g.logic = Some(read_string(bs)?);
    }
    if flags.has_max_bounce_velocity() {
        g.max_bounce_velocity = Some(bs.read_f32()?);
    }
    if flags.has_sub_id() {
        g.sub_id = Some(bs.read_f32()?);
    }
    if flags.has_flipper_flags() {
        g.flipper_flags = Some(bs.read_u8()?);
    }
    if flags.has_peg_info() {
        g.peg_info = Some(read_peginfo(bs)?);
    }
    if flags.has_movement() {
        g.movement = Some(read_movement_link(bs)?);
    }
    Ok(g)
}

fn write_generic(bs: &mut BitStream, flags: GenericFlags, g: &GenericData) -> Result<()> {
    if flags.is_rolly() {
        bs.write_f32(g.rolly.unwrap_or(0.0));
    }
    if flags.is_bouncy() {
        bs.write_f32(g.bouncy.unwrap_or(0.0));
    }
    if flags.has_unk0() {
        bs.write_i32(g.unk0.unwrap_or(0));
    }
    if flags.has_solid_color() {
        bs.write_u32(g.solid_color.unwrap_or(0));
    }
    if flags.has_outline_color() {
        bs.write_u32(g.outline_color.unwrap_or(0));
    }
    if flags.has_image() {
        write_string(bs, g.image.as_deref().unwrap_or(""));
    }
    if flags.has_image_dx() {
        bs.write_f32(g.image_dx.unwrap_or(0.0));
    }
    if flags.has_image_dy() {
        bs.write_f32(g.image_dy.unwrap_or(0.0));
    }
    if flags.has_rotation() {
        bs.write_f32(g.rotation.unwrap_or(0.0));
    }
    if flags.has_unk1() {
        bs.write_i32(g.unk1.unwrap_or(0));
    }
    if flags.has_id() {
        write_string(bs, g.id.as_deref().unwrap_or(""));
    }
    if flags.has_unk2() {
        bs.write_i32(g.unk2.unwrap_or(0));
    }
    if flags.has_sound() {
        bs.write_u8(g.sound.unwrap_or(0));
    }
    if flags.has_logic() {
        write_string(bs, g.logic.as_deref().unwrap_or(""));
    }
    if flags.has_max_bounce_velocity() {
        bs.write_f32(g.max_bounce_velocity.unwrap_or(0.0));
    }
    if flags.has_sub_id() {
        bs.write_f32(g.sub_id.unwrap_or(0.0));
    }
    if flags.has_flipper_flags() {
        bs.write_u8(g.flipper_flags.unwrap_or(0));
    }
    if flags.has_peg_info() {
        write_peginfo(bs, g.peg_info.as_ref().ok_or_else(|| Error::ParseError("hasPegInfo set with no peg_info".into()))?);
    }
    if flags.has_movement() {
        write_movement_link(bs, g.movement.as_ref().ok_or_else(|| Error::ParseError("hasMovementInfo set with no movement".into()))?)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Element / Level
// ---------------------------------------------------------------------

/// Reads one [`Element`]. A non-`1` magic word is a terminator: nothing
/// further is read, and a placeholder payload is returned (see
/// [`Element`]'s docs).
pub fn read_element(bs: &mut BitStream, version: u32) -> Result<Element> {
    let magic = bs.read_i32()?;
    if magic != 1 {
        return Ok(Element { magic, flags: GenericFlags(0), generic: GenericData::default(), payload: Payload::Rod(RodEntry::default()) });
    }
    let kind = bs.read_i32()?;
    let flags = if version == 4 {
        let low = bs.read_u8()? as u32;
        let mid = bs.read_u8()? as u32;
        let high = bs.read_u8()? as u32;
        GenericFlags((high << 16) | (mid << 8) | low)
    } else {
        GenericFlags(bs.read_u32()?)
    };
    let generic = read_generic(bs, flags)?;
    let payload = read_payload(bs, kind, version)?;
    Ok(Element { magic, flags, generic, payload })
}

/// Writes one [`Element`], mirroring [`read_element`]'s early exit.
pub fn write_element(bs: &mut BitStream, version: u32, element: &Element) -> Result<()> {
    bs.write_i32(element.magic);
    if element.magic != 1 {
        return Ok(());
    }
    bs.write_i32(element.payload.kind());
    if version == 4 {
        let v = element.flags.0;
        bs.write_u8((v & 0xFF) as u8);
        bs.write_u8(((v >> 8) & 0xFF) as u8);
        bs.write_u8(((v >> 16) & 0xFF) as u8);
    } else {
        bs.write_u32(element.flags.0);
    }
    write_generic(bs, element.flags, &element.generic)?;
    write_payload(bs, version, &element.payload)?;
    Ok(())
}

/// Parses a complete level binary.
pub fn decode_level(bytes: &[u8]) -> Result<Level> {
    let mut bs = BitStream::from_vec(bytes.to_vec());
    let version = bs.read_u32()?;
    let sync = bs.read_u8()?;
    let count = bs.read_u32()?;
    let mut elements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        elements.push(read_element(&mut bs, version)?);
    }
    let trailer = bs.remaining().to_vec();
    Ok(Level { version, sync, elements, trailer })
}

/// Serializes a level back to its binary form.
pub fn encode_level(level: &Level) -> Result<Vec<u8>> {
    let mut bs = BitStream::new();
    bs.write_u32(level.version);
    bs.write_u8(level.sync);
    bs.write_u32(level.elements.len() as u32);
    for e in &level.elements {
        write_element(&mut bs, level.version, e)?;
    }
    bs.write_bytes(&level.trailer);
    Ok(bs.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rod_element(magic: i32) -> Element {
        Element {
            magic,
            flags: GenericFlags(0),
            generic: GenericData::default(),
            payload: Payload::Rod(RodEntry { flags: 0, a: Point { x: 1.0, y: 2.0 }, b: Point { x: 3.0, y: 4.0 }, e: None, f: None }),
        }
    }

    #[test]
    fn level_roundtrip_simple_rod() {
        let level = Level { version: 0x23, sync: 7, elements: vec![rod_element(1)], trailer: vec![] };
        let bytes = encode_level(&level).unwrap();
        let decoded = decode_level(&bytes).unwrap();
        assert_eq!(decoded, level);
    }

    #[test]
    fn level_roundtrip_preserves_trailer() {
        let level = Level { version: 0x23, sync: 0, elements: vec![], trailer: vec![0xAA, 0xBB] };
        let bytes = encode_level(&level).unwrap();
        let decoded = decode_level(&bytes).unwrap();
        assert_eq!(decoded.trailer, vec![0xAA, 0xBB]);
    }

    #[test]
    fn variable_float_marker_inversion() {
        let mut bs = BitStream::new();
        write_variable_float(&mut bs, &VariableFloat::Static(2.5));
        bs.seek(0).unwrap();
        assert_eq!(bs.read_i8().unwrap(), 1);

        let mut bs2 = BitStream::new();
        write_variable_float(&mut bs2, &VariableFloat::Variable("speed".into()));
        bs2.seek(0).unwrap();
        assert_eq!(bs2.read_i8().unwrap(), 0);
    }

    #[test]
    fn version_4_uses_3byte_flags() {
        let mut flags = GenericFlags(0);
        flags.set_is_rolly(true);
        let element = Element { magic: 1, flags, generic: GenericData { rolly: Some(1.0), ..Default::default() }, payload: Payload::Rod(RodEntry::default()) };
        let level = Level { version: 4, sync: 0, elements: vec![element], trailer: vec![] };
        let bytes = encode_level(&level).unwrap();
        // version(4) + sync(1) + count(4) + magic(4) + eType(4) + 3-byte flags
        // + rolly f32(4) + rod payload (flags u8 + 2 points = 1 + 8 + 8)
        assert_eq!(bytes.len(), 4 + 1 + 4 + 4 + 4 + 3 + 4 + (1 + 8 + 8));
        let decoded = decode_level(&bytes).unwrap();
        assert_eq!(decoded, level);
    }

    #[test]
    fn brick_curved_false_when_type_five() {
        let mut bs = BitStream::new();
        let b = BrickEntry { flags_a: 0, flags_b: None, flags_c: (1 << 2), kind: Some(5), curved: false, length: 1.0, angle: 0.0, unk12: 0, ..Default::default() };
        write_brick(&mut bs, 0x10, &b);
        bs.seek(0).unwrap();
        let decoded = read_brick(&mut bs, 0x10).unwrap();
        assert_eq!(decoded.kind, Some(5));
        assert!(!decoded.curved);
    }

    #[test]
    fn movement_rotation_and_object_bits_independent() {
        let m = MovementInfo { shape: 1, anchor: Point { x: 0.0, y: 0.0 }, time_period: 10, rotation: Some(1.5), object: Some((2.0, 3.0)), ..Default::default() };
        let mut bs = BitStream::new();
        write_movement(&mut bs, &m).unwrap();
        bs.seek(0).unwrap();
        let decoded = read_movement(&mut bs).unwrap();
        assert_eq!(decoded.rotation, Some(1.5));
        assert_eq!(decoded.object, Some((2.0, 3.0)));
        assert_eq!(decoded.sub_movement, None);
    }

    #[test]
    fn movement_sub_movement_recurses() {
        let inner = MovementInfo { shape: 2, anchor: Point { x: 1.0, y: 1.0 }, time_period: 5, ..Default::default() };
        let link = MovementLink { id: 1, inner: Some(Box::new(inner.clone())) };
        let m = MovementInfo { shape: 1, anchor: Point { x: 0.0, y: 0.0 }, time_period: 10, sub_movement: Some((4.0, 5.0, link)), ..Default::default() };
        let mut bs = BitStream::new();
        write_movement(&mut bs, &m).unwrap();
        bs.seek(0).unwrap();
        let decoded = read_movement(&mut bs).unwrap();
        match decoded.sub_movement {
            Some((ox, oy, link)) => {
                assert_eq!((ox, oy), (4.0, 5.0));
                assert_eq!(link.inner.as_deref(), Some(&inner));
            }
            None => panic!("expected sub_movement"),
        }
        assert_eq!(decoded.rotation, None);
        assert_eq!(decoded.object, None);
    }

    #[test]
    fn teleport_recursive_element() {
        let inner = rod_element(1);
        let t = TeleportEntry { flags: (1 << 4), width: 10, height: 20, unk0: None, unk1: None, unk2: None, entry: Some(Box::new(inner.clone())), pos: None, unk3: None, unk4: None };
        let element = Element { magic: 1, flags: GenericFlags(0), generic: GenericData::default(), payload: Payload::Teleport(t) };
        let level = Level { version: 0x30, sync: 0, elements: vec![element], trailer: vec![] };
        let bytes = encode_level(&level).unwrap();
        let decoded = decode_level(&bytes).unwrap();
        match &decoded.elements[0].payload {
            Payload::Teleport(t) => assert_eq!(t.entry.as_deref(), Some(&inner)),
            _ => panic!("expected teleport"),
        }
    }
}
