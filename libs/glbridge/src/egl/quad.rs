// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Fullscreen quad pass used to draw a source texture into the bound
//! framebuffer (the format conversion step of the DMA path).

use std::ffi::CString;

const VERTEX_SHADER: &str = r#"
attribute vec2 position;
attribute vec2 texcoord;
varying vec2 v_texcoord;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    v_texcoord = texcoord;
}
"#;

const FRAGMENT_SHADER: &str = r#"
precision mediump float;
varying vec2 v_texcoord;
uniform sampler2D source;
void main() {
    gl_FragColor = texture2D(source, v_texcoord);
}
"#;

/// Interleaved x, y, u, v for a triangle strip covering the target.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 16] = [
    -1.0, -1.0, 0.0, 0.0,
     1.0, -1.0, 1.0, 0.0,
    -1.0,  1.0, 0.0, 1.0,
     1.0,  1.0, 1.0, 1.0,
];

fn compile_shader(kind: u32, source: &str) -> u32 {
    // SAFETY: plain GL object calls with a current context.
    unsafe {
        let shader = gl::CreateShader(kind);
        assert_ne!(shader, 0, "failed to create shader object");
        let source = CString::new(source).expect("shader source has no NUL");
        gl::ShaderSource(shader, 1, &source.as_ptr(), std::ptr::null());
        gl::CompileShader(shader);

        let mut status = 0;
        gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
        assert_ne!(status, 0, "shader compilation failed");
        shader
    }
}

/// Compiled conversion program plus its vertex buffer.
pub struct QuadRenderer {
    program: u32,
    vbo: u32,
    position: u32,
    texcoord: u32,
}

impl QuadRenderer {
    /// Compile and link. Must run with the context current; failure is a
    /// fatal precondition (broken GL driver).
    pub fn new() -> Self {
        let vertex = compile_shader(gl::VERTEX_SHADER, VERTEX_SHADER);
        let fragment = compile_shader(gl::FRAGMENT_SHADER, FRAGMENT_SHADER);

        // SAFETY: plain GL object calls with a current context.
        unsafe {
            let program = gl::CreateProgram();
            gl::AttachShader(program, vertex);
            gl::AttachShader(program, fragment);
            gl::LinkProgram(program);
            let mut status = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            assert_ne!(status, 0, "program link failed");
            gl::DeleteShader(vertex);
            gl::DeleteShader(fragment);

            let position_name = CString::new("position").expect("static");
            let texcoord_name = CString::new("texcoord").expect("static");
            let source_name = CString::new("source").expect("static");
            let position = gl::GetAttribLocation(program, position_name.as_ptr());
            let texcoord = gl::GetAttribLocation(program, texcoord_name.as_ptr());
            assert!(position >= 0 && texcoord >= 0, "quad attributes missing");

            let mut vbo = 0;
            gl::GenBuffers(1, &mut vbo);
            gl::BindBuffer(gl::ARRAY_BUFFER, vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                std::mem::size_of_val(&QUAD_VERTICES) as isize,
                QUAD_VERTICES.as_ptr() as *const _,
                gl::STATIC_DRAW,
            );
            gl::BindBuffer(gl::ARRAY_BUFFER, 0);

            gl::UseProgram(program);
            let source_loc = gl::GetUniformLocation(program, source_name.as_ptr());
            gl::Uniform1i(source_loc, 0);
            gl::UseProgram(0);

            Self {
                program,
                vbo,
                position: position as u32,
                texcoord: texcoord as u32,
            }
        }
    }

    /// Draw `texture` over the bound framebuffer's full viewport.
    pub fn draw(&self, target: u32, texture: u32) {
        let stride = (4 * std::mem::size_of::<f32>()) as i32;
        // SAFETY: draw call against the currently bound framebuffer.
        unsafe {
            gl::Disable(gl::DEPTH_TEST);
            gl::Disable(gl::BLEND);
            gl::UseProgram(self.program);
            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(target, texture);

            gl::BindBuffer(gl::ARRAY_BUFFER, self.vbo);
            gl::EnableVertexAttribArray(self.position);
            gl::VertexAttribPointer(
                self.position,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                std::ptr::null(),
            );
            gl::EnableVertexAttribArray(self.texcoord);
            gl::VertexAttribPointer(
                self.texcoord,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                (2 * std::mem::size_of::<f32>()) as *const _,
            );

            gl::DrawArrays(gl::TRIANGLE_STRIP, 0, 4);

            gl::DisableVertexAttribArray(self.position);
            gl::DisableVertexAttribArray(self.texcoord);
            gl::BindBuffer(gl::ARRAY_BUFFER, 0);
            gl::BindTexture(target, 0);
            gl::UseProgram(0);
        }
    }
}

impl Drop for QuadRenderer {
    fn drop(&mut self) {
        // SAFETY: object deletion; valid with or without a bound program.
        unsafe {
            gl::DeleteBuffers(1, &self.vbo);
            gl::DeleteProgram(self.program);
        }
    }
}
